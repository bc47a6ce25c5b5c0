use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {db_path}"))?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS poll_targets (
                id TEXT PRIMARY KEY,
                rpc_endpoint TEXT NOT NULL,
                display_name TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                target_id TEXT PRIMARY KEY,
                last_processed_block INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS live_samples (
                target_id TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_timestamp INTEGER NOT NULL,
                block_time_seconds INTEGER NOT NULL,
                tx_count INTEGER NOT NULL,
                gas_used INTEGER NOT NULL,
                gas_limit INTEGER NOT NULL,
                utilization_percent REAL NOT NULL,
                tps REAL NOT NULL,
                PRIMARY KEY (target_id, block_number)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS gas_utilization (
                target_id TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_timestamp INTEGER NOT NULL,
                gas_used INTEGER NOT NULL,
                gas_limit INTEGER NOT NULL,
                utilization_percent REAL NOT NULL,
                PRIMARY KEY (target_id, block_number)
            )",
            [],
        )?;

        // One row per scan span; the view below adds spans up per minute.
        // Spans of one target never overlap, see `replace_transfer_span`.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS transfer_bucket_contributions (
                target_id TEXT NOT NULL,
                bucket_start_minute INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('erc20', 'erc721')),
                source_from_block INTEGER NOT NULL,
                source_to_block INTEGER NOT NULL,
                count INTEGER NOT NULL,
                PRIMARY KEY (target_id, bucket_start_minute, kind, source_from_block)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE VIEW IF NOT EXISTS transfer_buckets AS
             SELECT target_id, bucket_start_minute, kind, SUM(count) AS count
             FROM transfer_bucket_contributions
             GROUP BY target_id, bucket_start_minute, kind",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transfer_contributions_span
             ON transfer_bucket_contributions(target_id, source_from_block, source_to_block)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_live_samples_timestamp
             ON live_samples(target_id, block_timestamp)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_gas_utilization_timestamp
             ON gas_utilization(target_id, block_timestamp)",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_schema_idempotently() {
        let db = Database::in_memory().unwrap();
        db.create_tables().unwrap();

        let tables: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();

        for expected in [
            "checkpoints",
            "gas_utilization",
            "live_samples",
            "poll_targets",
            "transfer_bucket_contributions",
            "transfer_buckets",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn accepts_sqlite_url_prefix() {
        assert!(Database::new("sqlite::memory:").is_ok());
    }
}
