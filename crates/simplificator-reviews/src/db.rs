use rusqlite::Connection;

use crate::error::Result;

/// Create the reviews table and its recency index. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reviews (
            id           TEXT PRIMARY KEY,
            title        TEXT NOT NULL,
            code_snippet TEXT NOT NULL,
            description  TEXT NOT NULL,
            score        INTEGER NOT NULL CHECK (score BETWEEN 0 AND 10),
            suggestions  TEXT NOT NULL DEFAULT '[]',
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_created
            ON reviews(created_at DESC);",
    )?;
    Ok(())
}
