use anyhow::Result;
use chain_metrics_collector::config::Config;
use chain_metrics_collector::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::from_env()?;

    println!("Running migrations on database: {}", config.database_url);

    let _db = Database::new(&config.database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
