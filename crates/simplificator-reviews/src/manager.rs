use std::sync::{Mutex, MutexGuard};

use chrono::SecondsFormat;
use rusqlite::Connection;
use simplificator_core::types::MAX_SCORE;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, ReviewStoreError};
use crate::types::{NewReview, Review};

const SELECT_COLUMNS: &str =
    "SELECT id, title, code_snippet, description, score, suggestions, created_at FROM reviews";

/// Stored reviews behind a single mutex-guarded SQLite connection.
pub struct ReviewStore {
    db: Mutex<Connection>,
}

impl ReviewStore {
    /// Wrap a connection already initialised with `init_db`.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| ReviewStoreError::LockPoisoned)
    }

    #[instrument(skip(self, review), fields(score = review.score))]
    pub fn insert(&self, review: NewReview) -> Result<Review> {
        if review.score > MAX_SCORE {
            return Err(ReviewStoreError::InvalidScore(review.score));
        }
        let id = Uuid::now_v7().to_string();
        let created_at = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let suggestions = serde_json::to_string(&review.suggestions)?;

        let db = self.conn()?;
        db.execute(
            "INSERT INTO reviews
             (id, title, code_snippet, description, score, suggestions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                review.title,
                review.code_snippet,
                review.description,
                review.score,
                suggestions,
                created_at
            ],
        )?;
        debug!(%id, "review stored");

        Ok(Review {
            id,
            title: review.title,
            code_snippet: review.code_snippet,
            description: review.description,
            score: review.score,
            suggestions: review.suggestions,
            created_at,
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Option<Review>> {
        let db = self.conn()?;
        let row = db.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            rusqlite::params![id],
            read_row,
        );
        match row {
            Ok(raw) => Ok(Some(raw.into_review()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ReviewStoreError::Database(e)),
        }
    }

    /// Most recent reviews, newest first. `usize::MAX` lists everything.
    #[instrument(skip(self))]
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Review>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(rusqlite::params![limit], read_row)?;

        let mut reviews = Vec::new();
        for row in rows {
            match row.map_err(ReviewStoreError::from).and_then(RawReview::into_review) {
                Ok(review) => reviews.push(review),
                Err(e) => warn!(error = %e, "skipping unreadable review row"),
            }
        }
        Ok(reviews)
    }
}

/// Row as stored; suggestions still JSON text.
struct RawReview {
    id: String,
    title: String,
    code_snippet: String,
    description: String,
    score: u8,
    suggestions: String,
    created_at: String,
}

impl RawReview {
    fn into_review(self) -> Result<Review> {
        Ok(Review {
            suggestions: serde_json::from_str(&self.suggestions)?,
            id: self.id,
            title: self.title,
            code_snippet: self.code_snippet,
            description: self.description,
            score: self.score,
            created_at: self.created_at,
        })
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawReview> {
    Ok(RawReview {
        id: row.get(0)?,
        title: row.get(1)?,
        code_snippet: row.get(2)?,
        description: row.get(3)?,
        score: row.get(4)?,
        suggestions: row.get(5)?,
        created_at: row.get(6)?,
    })
}
