use anyhow::Result;

use newsrelay_core::PipelineRunner;

pub async fn run(runner: &PipelineRunner) -> Result<()> {
    println!("Running one cycle over {} sources...\n", runner.source_count());

    let report = runner.run_cycle().await?;

    for source in &report.sources {
        if source.listing_failed {
            println!("  {} - listing unreachable", source.source_name);
            continue;
        }
        println!(
            "  {} - {} found, {} published, {} already sent, {} stale, {} failed",
            source.source_name,
            source.discovered,
            source.published,
            source.skipped_duplicate,
            source.skipped_stale,
            source.failed,
        );
    }

    println!("\nCycle complete: {}", report);

    Ok(())
}
