use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, to_u64},
    models::PostureCount,
    Database,
};

fn row_to_posture_count(row: &Row) -> Result<PostureCount> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let count: i64 = row.get("count")?;

    Ok(PostureCount {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        posture_label: row.get("posture_label")?,
        count: to_u64(count, "count")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Read-or-create the (session, label) row and add one, inside a single
    /// transaction. Any failure rolls the transaction back. Returns the new count.
    pub async fn increment_posture_count(&self, session_id: &str, posture_label: &str) -> Result<u64> {
        let session_id = session_id.to_string();
        let posture_label = posture_label.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn
                .transaction()
                .context("failed to open posture count transaction")?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT count FROM posture_counts
                     WHERE session_id = ?1 AND posture_label = ?2",
                    params![session_id, posture_label],
                    |row| row.get(0),
                )
                .optional()?;

            let next = match existing {
                Some(count) => {
                    let next = count + 1;
                    tx.execute(
                        "UPDATE posture_counts
                         SET count = ?1,
                             updated_at = ?2
                         WHERE session_id = ?3 AND posture_label = ?4",
                        params![next, now, session_id, posture_label],
                    )
                    .context("failed to update posture count")?;
                    next
                }
                None => {
                    tx.execute(
                        "INSERT INTO posture_counts (session_id, posture_label, count, created_at, updated_at)
                         VALUES (?1, ?2, 1, ?3, ?3)",
                        params![session_id, posture_label, now],
                    )
                    .context("failed to insert posture count")?;
                    1
                }
            };

            tx.commit().context("failed to commit posture count")?;
            to_u64(next, "count")
        })
        .await
    }

    pub async fn get_posture_counts(&self, session_id: &str) -> Result<Vec<PostureCount>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, posture_label, count, created_at, updated_at
                 FROM posture_counts
                 WHERE session_id = ?1
                 ORDER BY count DESC, posture_label ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut counts = Vec::new();
            while let Some(row) = rows.next()? {
                counts.push(row_to_posture_count(row)?);
            }

            Ok(counts)
        })
        .await
    }
}
