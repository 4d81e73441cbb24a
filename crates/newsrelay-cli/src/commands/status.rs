use anyhow::Result;

use newsrelay_core::{AppConfig, Database, SqliteDedupStore, TelegramPublisher};

pub async fn run(db: Database, config: &AppConfig) -> Result<()> {
    let store = SqliteDedupStore::new(db);

    println!("Database: {}", config.database_path().display());
    println!("Published articles: {}\n", store.count(None).await?);

    let counts = store.count_by_source().await?;
    println!("By source:");
    for source in &config.sources {
        let count = counts
            .iter()
            .find(|(id, _)| id == &source.id)
            .map_or(0, |(_, count)| *count);
        println!("  {} ({}) - {}", source.name, source.id, count);
    }

    let recent = store.recent(5).await?;
    if !recent.is_empty() {
        println!("\nMost recent:");
        for record in &recent {
            println!(
                "  [{}] {} - {}",
                record.processed_at.format("%Y-%m-%d %H:%M"),
                record.source_name,
                record.title
            );
            println!("    {}", record.article_ref.url);
        }
    }

    let publisher = TelegramPublisher::new(&config.telegram, config.retry.policy())?;
    match publisher.get_me().await {
        Ok(bot) => println!(
            "\nTelegram: connected as @{} ({})",
            bot.username.as_deref().unwrap_or(&bot.first_name),
            bot.id
        ),
        Err(e) => println!("\nTelegram: check failed: {}", e),
    }

    Ok(())
}
