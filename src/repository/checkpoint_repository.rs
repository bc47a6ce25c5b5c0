use crate::models::Checkpoint;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct CheckpointRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> CheckpointRepository<'a> {
    // MAX() keeps the cursor from moving backwards even if a stale writer races us.
    const ADVANCE_CHECKPOINT: &'static str =
        "INSERT INTO checkpoints (target_id, last_processed_block, updated_at)
         VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER))
         ON CONFLICT(target_id) DO UPDATE SET
            last_processed_block = MAX(last_processed_block, excluded.last_processed_block),
            updated_at = excluded.updated_at";

    const GET_LAST_PROCESSED_BLOCK: &'static str =
        "SELECT last_processed_block FROM checkpoints WHERE target_id = ?1";

    const SELECT_CHECKPOINTS: &'static str =
        "SELECT target_id, last_processed_block, updated_at FROM checkpoints ORDER BY target_id";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_last_processed_block(&self, target_id: &str) -> Result<Option<u64>> {
        let block: Option<u64> = self
            .conn
            .query_row(Self::GET_LAST_PROCESSED_BLOCK, params![target_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(block)
    }

    pub fn advance(&self, target_id: &str, block_number: u64) -> Result<()> {
        self.conn
            .execute(Self::ADVANCE_CHECKPOINT, params![target_id, block_number])?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(Self::SELECT_CHECKPOINTS)?;
        let checkpoints = stmt
            .query_map([], |row| {
                Ok(Checkpoint {
                    target_id: row.get(0)?,
                    last_processed_block: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[test]
    fn absent_until_first_advance() {
        let db = Database::in_memory().unwrap();
        let repo = CheckpointRepository::new(&db.conn);

        assert_eq!(repo.get_last_processed_block("t1").unwrap(), None);
        repo.advance("t1", 9_000).unwrap();
        assert_eq!(repo.get_last_processed_block("t1").unwrap(), Some(9_000));
    }

    #[test]
    fn never_moves_backwards() {
        let db = Database::in_memory().unwrap();
        let repo = CheckpointRepository::new(&db.conn);

        repo.advance("t1", 500).unwrap();
        repo.advance("t1", 400).unwrap();
        assert_eq!(repo.get_last_processed_block("t1").unwrap(), Some(500));

        repo.advance("t1", 501).unwrap();
        assert_eq!(repo.get_last_processed_block("t1").unwrap(), Some(501));

        let all = repo.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_processed_block, 501);
        assert!(all[0].updated_at > 0);
    }
}
