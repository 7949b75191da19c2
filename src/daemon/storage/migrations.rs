use rusqlite::Connection;
use tracing::info;

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS activity_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    date TEXT NOT NULL,
    ciphertext BLOB NOT NULL,
    nonce BLOB NOT NULL,
    tag BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS screenshot_hashes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    date TEXT NOT NULL,
    hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL UNIQUE,
    total_active_minutes REAL NOT NULL DEFAULT 0,
    coding_minutes REAL NOT NULL DEFAULT 0,
    meeting_minutes REAL NOT NULL DEFAULT 0,
    browser_minutes REAL NOT NULL DEFAULT 0,
    communication_minutes REAL NOT NULL DEFAULT 0,
    productivity_minutes REAL NOT NULL DEFAULT 0,
    merkle_root TEXT,
    submitted_to_chain INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sample_date ON activity_samples(date);
CREATE INDEX IF NOT EXISTS idx_screenshot_date ON screenshot_hashes(date, timestamp);
";

/// Columns that were introduced after the base schema. Each entry is applied only when the
/// column is missing, so running the list twice changes nothing.
const ADDED_COLUMNS: [(&str, &str, &str); 2] = [
    ("daily_summaries", "shelby_blob_id", "TEXT"),
    ("daily_summaries", "other_minutes", "REAL NOT NULL DEFAULT 0"),
];

const POST_COLUMN_SCHEMA: &str = "
CREATE INDEX IF NOT EXISTS idx_blob_id ON daily_summaries(shelby_blob_id);
";

pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(BASE_SCHEMA)?;
    for (table, column, declaration) in ADDED_COLUMNS {
        if !column_exists(&tx, table, column)? {
            tx.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {column} {declaration}"
            ))?;
            info!("Added column {table}.{column}");
            if column == "other_minutes" {
                backfill_other_minutes(&tx)?;
            }
        }
    }
    tx.execute_batch(POST_COLUMN_SCHEMA)?;
    tx.commit()
}

/// Older rows credited uncategorized time to the total only. Moving that remainder into
/// `other_minutes` keeps `total == sum of categories`, so later folds never lower the total.
fn backfill_other_minutes(conn: &Connection) -> rusqlite::Result<()> {
    let updated = conn.execute(
        "UPDATE daily_summaries SET other_minutes = MAX(total_active_minutes - (coding_minutes
            + meeting_minutes + browser_minutes + communication_minutes + productivity_minutes), 0)",
        [],
    )?;
    info!("Backfilled other_minutes for {updated} day(s)");
    Ok(())
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>("name"))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use rusqlite::{params, Connection};

    use super::{column_exists, run_migrations};

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        run_migrations(&mut conn)?;
        assert!(column_exists(&conn, "daily_summaries", "other_minutes")?);
        assert!(column_exists(&conn, "daily_summaries", "shelby_blob_id")?);
        Ok(())
    }

    #[test]
    fn test_uncategorized_total_moves_into_other() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        // Layout written before the blob id and the `other` bucket existed.
        conn.execute_batch(
            "CREATE TABLE daily_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL UNIQUE,
                total_active_minutes REAL NOT NULL DEFAULT 0,
                coding_minutes REAL NOT NULL DEFAULT 0,
                meeting_minutes REAL NOT NULL DEFAULT 0,
                browser_minutes REAL NOT NULL DEFAULT 0,
                communication_minutes REAL NOT NULL DEFAULT 0,
                productivity_minutes REAL NOT NULL DEFAULT 0,
                merkle_root TEXT,
                submitted_to_chain INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        conn.execute(
            "INSERT INTO daily_summaries (date, total_active_minutes, coding_minutes, meeting_minutes)
             VALUES (?1, ?2, ?3, ?4)",
            params!["2025-01-01", 5.0, 3.0, 1.0],
        )?;
        conn.execute(
            "INSERT INTO daily_summaries (date, total_active_minutes, coding_minutes)
             VALUES (?1, ?2, ?3)",
            params!["2025-01-02", 2.0, 2.0],
        )?;

        run_migrations(&mut conn)?;
        // A second run must not touch rows again.
        conn.execute(
            "UPDATE daily_summaries SET other_minutes = 0.5 WHERE date = ?1",
            params!["2025-01-02"],
        )?;
        run_migrations(&mut conn)?;

        let other = |date: &str| -> rusqlite::Result<f64> {
            conn.query_row(
                "SELECT other_minutes FROM daily_summaries WHERE date = ?1",
                params![date],
                |row| row.get(0),
            )
        };
        assert_eq!(other("2025-01-01")?, 1.0);
        assert_eq!(other("2025-01-02")?, 0.5);
        Ok(())
    }

    #[test]
    fn test_legacy_rows_survive_column_addition() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        // Layout written by builds that already had the blob id but no `other` bucket.
        conn.execute_batch(
            "CREATE TABLE daily_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL UNIQUE,
                total_active_minutes REAL NOT NULL DEFAULT 0,
                coding_minutes REAL NOT NULL DEFAULT 0,
                meeting_minutes REAL NOT NULL DEFAULT 0,
                browser_minutes REAL NOT NULL DEFAULT 0,
                communication_minutes REAL NOT NULL DEFAULT 0,
                productivity_minutes REAL NOT NULL DEFAULT 0,
                merkle_root TEXT,
                submitted_to_chain INTEGER NOT NULL DEFAULT 0,
                shelby_blob_id TEXT
            );",
        )?;
        conn.execute(
            "INSERT INTO daily_summaries (date, total_active_minutes, coding_minutes, shelby_blob_id)
             VALUES (?1, ?2, ?3, ?4)",
            params!["2025-01-01", 3.5, 3.5, "blob_old"],
        )?;

        run_migrations(&mut conn)?;

        let (total, other, blob): (f64, f64, Option<String>) = conn.query_row(
            "SELECT total_active_minutes, other_minutes, shelby_blob_id FROM daily_summaries WHERE date = ?1",
            params!["2025-01-01"],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        assert_eq!(total, 3.5);
        assert_eq!(other, 0.);
        assert_eq!(blob.as_deref(), Some("blob_old"));
        Ok(())
    }
}
