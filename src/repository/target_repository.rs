use crate::models::PollTarget;
use anyhow::Result;
use rusqlite::{Row, params};

pub struct TargetRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TargetRepository<'a> {
    const UPSERT_TARGET: &'static str =
        "INSERT INTO poll_targets (id, rpc_endpoint, display_name) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
            rpc_endpoint = excluded.rpc_endpoint,
            display_name = excluded.display_name";

    const DELETE_TARGET: &'static str = "DELETE FROM poll_targets WHERE id = ?1";

    const SELECT_TARGETS: &'static str =
        "SELECT id, rpc_endpoint, display_name FROM poll_targets ORDER BY id";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, target: &PollTarget) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_TARGET,
            params![target.id, target.rpc_endpoint, target.display_name],
        )?;
        Ok(())
    }

    /// Returns whether a target was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.conn.execute(Self::DELETE_TARGET, params![id])?;
        Ok(removed > 0)
    }

    pub fn list(&self) -> Result<Vec<PollTarget>> {
        let mut stmt = self.conn.prepare(Self::SELECT_TARGETS)?;
        let targets = stmt
            .query_map([], Self::row_to_target)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn row_to_target(row: &Row) -> rusqlite::Result<PollTarget> {
        Ok(PollTarget {
            id: row.get(0)?,
            rpc_endpoint: row.get(1)?,
            display_name: row.get(2)?,
        })
    }
}
