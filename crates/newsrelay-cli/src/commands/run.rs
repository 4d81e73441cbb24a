use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use newsrelay_core::{PipelineRunner, SchedulerService};

/// Resolve a signal once the process is asked to terminate
async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    }

    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

/// Run the scheduler until Ctrl+C or SIGTERM
pub async fn run(runner: Arc<PipelineRunner>, interval: Duration) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate_signal() => {}
        }
        info!("Received shutdown signal, finishing current cycle");
        let _ = shutdown_tx.send(true);
    });

    println!(
        "newsrelay started (PID: {}). Press Ctrl+C to stop.",
        std::process::id()
    );
    println!("  Sources: {}", runner.source_count());
    println!("  Interval: {} hours", interval.as_secs() / 3600);

    SchedulerService::new(runner, interval).run(shutdown_rx).await;

    println!("newsrelay stopped.");

    Ok(())
}
