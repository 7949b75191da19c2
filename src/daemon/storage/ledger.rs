use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::{
    daemon::error::TrackerError,
    utils::time::{date_to_key, key_to_date},
};

use super::{
    entities::{DailyAggregate, EncryptedEnvelope, ScreenshotHashRecord},
    migrations::run_migrations,
};

/// Interface for abstracting the durable ledger. Every mutating call has reached the disk by
/// the time it returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Appends one encrypted activity sample under its local calendar date.
    async fn append_sample(
        &self,
        timestamp: DateTime<Utc>,
        date: NaiveDate,
        envelope: EncryptedEnvelope,
    ) -> Result<(), TrackerError>;

    async fn append_screenshot_hash(&self, record: ScreenshotHashRecord)
        -> Result<(), TrackerError>;

    /// Inserts the aggregate or replaces every field of the existing row for its date.
    async fn upsert_daily(&self, aggregate: DailyAggregate) -> Result<(), TrackerError>;

    /// `None` when nothing was recorded for `date`.
    async fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>, TrackerError>;

    /// Up to `limit` aggregates, newest date first.
    async fn recent_daily(&self, limit: usize) -> Result<Vec<DailyAggregate>, TrackerError>;

    /// Screenshot hashes of `date`, oldest first.
    async fn screenshot_hashes_for(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ScreenshotHashRecord>, TrackerError>;

    async fn last_screenshot_hash(&self) -> Result<Option<ScreenshotHashRecord>, TrackerError>;

    /// Stored sample envelopes of `date` in insertion order.
    async fn sample_envelopes_for(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<EncryptedEnvelope>, TrackerError>;

    async fn sample_count_for(&self, date: NaiveDate) -> Result<u64, TrackerError>;
}

type LedgerTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum LedgerCommand {
    Execute(LedgerTask),
    Shutdown,
}

struct LedgerWorker {
    sender: mpsc::Sender<LedgerCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for LedgerWorker {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(LedgerCommand::Shutdown) {
                error!("Failed to send shutdown to ledger thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join ledger thread: {join_err:?}");
            }
        }
    }
}

/// The main realization of [LedgerStore]. SQLite is blocking, so the connection lives on its
/// own thread and callers await replies over a oneshot channel.
#[derive(Clone)]
pub struct SqliteLedger {
    inner: Arc<LedgerWorker>,
}

impl SqliteLedger {
    pub fn open(path: PathBuf) -> Result<Self, TrackerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (command_tx, command_rx) = mpsc::channel::<LedgerCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), TrackerError>>();
        let path_for_thread = path.clone();

        let worker = thread::Builder::new()
            .name("workchain-ledger".into())
            .spawn(move || {
                let mut conn = match open_connection(&path_for_thread) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.into()));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    error!("Ledger initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        LedgerCommand::Execute(task) => task(&mut conn),
                        LedgerCommand::Shutdown => break,
                    }
                }

                debug!("Ledger thread shutting down");
            })?;

        ready_rx
            .recv()
            .map_err(|_| TrackerError::StorageUnavailable)??;

        info!("Ledger opened at {}", path.display());

        Ok(Self {
            inner: Arc::new(LedgerWorker {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TrackerError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = LedgerCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Ledger caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|_| TrackerError::StorageUnavailable)?;

        reply_rx
            .await
            .map_err(|_| TrackerError::StorageUnavailable)?
    }
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Every commit is fsynced before the call returns.
    conn.pragma_update(None, "synchronous", "FULL")?;
    run_migrations(&mut conn)?;
    Ok(conn)
}

const DAILY_COLUMNS: &str = "date, total_active_minutes, coding_minutes, meeting_minutes, \
     browser_minutes, communication_minutes, productivity_minutes, other_minutes, merkle_root, \
     submitted_to_chain, shelby_blob_id";

fn row_to_daily(row: &Row) -> Result<DailyAggregate, TrackerError> {
    let date: String = row.get("date")?;
    Ok(DailyAggregate {
        date: key_to_date(&date).map_err(|e| TrackerError::CorruptRecord(e.to_string()))?,
        total_active_minutes: row.get("total_active_minutes")?,
        coding_minutes: row.get("coding_minutes")?,
        meeting_minutes: row.get("meeting_minutes")?,
        browser_minutes: row.get("browser_minutes")?,
        communication_minutes: row.get("communication_minutes")?,
        productivity_minutes: row.get("productivity_minutes")?,
        other_minutes: row.get("other_minutes")?,
        merkle_root: row.get("merkle_root")?,
        submitted_to_chain: row.get::<_, i64>("submitted_to_chain")? != 0,
        blob_id: row.get("shelby_blob_id")?,
    })
}

fn row_to_screenshot(row: &Row) -> Result<ScreenshotHashRecord, TrackerError> {
    let millis: i64 = row.get("timestamp")?;
    let hash: String = row.get("hash")?;
    Ok(ScreenshotHashRecord {
        timestamp: DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| TrackerError::CorruptRecord(format!("timestamp {millis}")))?,
        hash: hash.into(),
    })
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn append_sample(
        &self,
        timestamp: DateTime<Utc>,
        date: NaiveDate,
        envelope: EncryptedEnvelope,
    ) -> Result<(), TrackerError> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO activity_samples (timestamp, date, ciphertext, nonce, tag)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    timestamp.timestamp_millis(),
                    date_to_key(date),
                    envelope.ciphertext,
                    envelope.nonce,
                    envelope.tag,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn append_screenshot_hash(
        &self,
        record: ScreenshotHashRecord,
    ) -> Result<(), TrackerError> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO screenshot_hashes (timestamp, date, hash) VALUES (?1, ?2, ?3)",
                params![
                    record.timestamp.timestamp_millis(),
                    date_to_key(record.date()),
                    record.hash.as_ref(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_daily(&self, aggregate: DailyAggregate) -> Result<(), TrackerError> {
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO daily_summaries ({DAILY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(date) DO UPDATE SET
                        total_active_minutes = excluded.total_active_minutes,
                        coding_minutes = excluded.coding_minutes,
                        meeting_minutes = excluded.meeting_minutes,
                        browser_minutes = excluded.browser_minutes,
                        communication_minutes = excluded.communication_minutes,
                        productivity_minutes = excluded.productivity_minutes,
                        other_minutes = excluded.other_minutes,
                        merkle_root = excluded.merkle_root,
                        submitted_to_chain = excluded.submitted_to_chain,
                        shelby_blob_id = excluded.shelby_blob_id"
                ),
                params![
                    date_to_key(aggregate.date),
                    aggregate.total_active_minutes,
                    aggregate.coding_minutes,
                    aggregate.meeting_minutes,
                    aggregate.browser_minutes,
                    aggregate.communication_minutes,
                    aggregate.productivity_minutes,
                    aggregate.other_minutes,
                    aggregate.merkle_root,
                    aggregate.submitted_to_chain,
                    aggregate.blob_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>, TrackerError> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DAILY_COLUMNS} FROM daily_summaries WHERE date = ?1"
            ))?;
            let mut rows = stmt.query(params![date_to_key(date)])?;
            rows.next()?.map(row_to_daily).transpose()
        })
        .await
    }

    async fn recent_daily(&self, limit: usize) -> Result<Vec<DailyAggregate>, TrackerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DAILY_COLUMNS} FROM daily_summaries ORDER BY date DESC LIMIT ?1"
            ))?;
            let mut rows = stmt.query(params![limit])?;
            let mut aggregates = Vec::new();
            while let Some(row) = rows.next()? {
                aggregates.push(row_to_daily(row)?);
            }
            Ok(aggregates)
        })
        .await
    }

    async fn screenshot_hashes_for(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ScreenshotHashRecord>, TrackerError> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, hash FROM screenshot_hashes
                 WHERE date = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let mut rows = stmt.query(params![date_to_key(date)])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_screenshot(row)?);
            }
            Ok(records)
        })
        .await
    }

    async fn last_screenshot_hash(&self) -> Result<Option<ScreenshotHashRecord>, TrackerError> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, hash FROM screenshot_hashes
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
            )?;
            let mut rows = stmt.query([])?;
            rows.next()?.map(row_to_screenshot).transpose()
        })
        .await
    }

    async fn sample_envelopes_for(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<EncryptedEnvelope>, TrackerError> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT ciphertext, nonce, tag FROM activity_samples
                 WHERE date = ?1
                 ORDER BY id ASC",
            )?;
            let envelopes = stmt
                .query_map(params![date_to_key(date)], |row| {
                    Ok(EncryptedEnvelope {
                        ciphertext: row.get(0)?,
                        nonce: row.get(1)?,
                        tag: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(envelopes)
        })
        .await
    }

    async fn sample_count_for(&self, date: NaiveDate) -> Result<u64, TrackerError> {
        self.execute(move |conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT COUNT(*) FROM activity_samples WHERE date = ?1",
                    params![date_to_key(date)],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0).max(0) as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::{
        codec::{Codec, DeviceKey},
        storage::entities::{DailyAggregate, ScreenshotHashRecord},
    };

    use super::{LedgerStore, SqliteLedger};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn local_noon(day: u32) -> DateTime<Utc> {
        Local
            .from_local_datetime(&date(day).and_hms_opt(12, 0, 0).unwrap())
            .unwrap()
            .with_timezone(&Utc)
    }

    fn aggregate(day: u32, coding: f64) -> DailyAggregate {
        DailyAggregate {
            total_active_minutes: coding,
            coding_minutes: coding,
            ..DailyAggregate::empty(date(day))
        }
    }

    #[tokio::test]
    async fn test_missing_date_is_not_found() -> Result<()> {
        let dir = tempdir()?;
        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;
        assert_eq!(ledger.get_daily(date(1)).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_row() -> Result<()> {
        let dir = tempdir()?;
        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;

        let first = DailyAggregate {
            blob_id: Some("blob_first".into()),
            merkle_root: Some("root".into()),
            ..aggregate(1, 2.0)
        };
        ledger.upsert_daily(first).await?;

        let second = aggregate(1, 2.5);
        ledger.upsert_daily(second.clone()).await?;

        assert_eq!(ledger.get_daily(date(1)).await?, Some(second));
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;
        let value = DailyAggregate {
            submitted_to_chain: true,
            ..aggregate(3, 7.5)
        };

        ledger.upsert_daily(value.clone()).await?;
        let once = ledger.get_daily(date(3)).await?;
        ledger.upsert_daily(value.clone()).await?;
        let twice = ledger.get_daily(date(3)).await?;

        assert_eq!(once, twice);
        assert_eq!(twice, Some(value));
        assert_eq!(ledger.recent_daily(10).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_recent_daily_orders_by_date_desc() -> Result<()> {
        let dir = tempdir()?;
        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;
        for day in [2, 5, 1, 4, 3] {
            ledger.upsert_daily(aggregate(day, day as f64)).await?;
        }

        let recent = ledger.recent_daily(3).await?;
        let dates: Vec<NaiveDate> = recent.iter().map(|v| v.date).collect();
        assert_eq!(dates, vec![date(5), date(4), date(3)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("workchain.db");
        {
            let ledger = SqliteLedger::open(path.clone())?;
            ledger.upsert_daily(aggregate(1, 4.0)).await?;
            ledger
                .append_screenshot_hash(ScreenshotHashRecord {
                    timestamp: local_noon(1),
                    hash: "abc".into(),
                })
                .await?;
        }

        let ledger = SqliteLedger::open(path)?;
        assert_eq!(ledger.get_daily(date(1)).await?, Some(aggregate(1, 4.0)));
        assert_eq!(
            ledger.last_screenshot_hash().await?.map(|v| v.hash),
            Some("abc".into())
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_samples_are_stored_encrypted_per_date() -> Result<()> {
        let dir = tempdir()?;
        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;
        let codec = Codec::new(&DeviceKey::session());

        let plaintext = br#"{"appName":"Code"}"#;
        let first = codec.encrypt(plaintext)?;
        let second = codec.encrypt(plaintext)?;
        ledger
            .append_sample(local_noon(1), date(1), first.clone())
            .await?;
        ledger
            .append_sample(local_noon(1) + Duration::seconds(30), date(1), second.clone())
            .await?;
        ledger
            .append_sample(local_noon(2), date(2), codec.encrypt(plaintext)?)
            .await?;

        let stored = ledger.sample_envelopes_for(date(1)).await?;
        assert_eq!(stored, vec![first, second]);
        assert!(stored
            .iter()
            .all(|v| !v.ciphertext.windows(plaintext.len()).any(|w| w == plaintext)));
        assert_eq!(codec.decrypt(&stored[0])?, plaintext);
        assert_eq!(ledger.sample_count_for(date(1)).await?, 2);
        assert_eq!(ledger.sample_count_for(date(9)).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_screenshot_hashes_for_date() -> Result<()> {
        let dir = tempdir()?;
        let ledger = SqliteLedger::open(dir.path().join("workchain.db"))?;
        let records = [
            ScreenshotHashRecord {
                timestamp: local_noon(1) + Duration::minutes(5),
                hash: "second".into(),
            },
            ScreenshotHashRecord {
                timestamp: local_noon(1),
                hash: "first".into(),
            },
            ScreenshotHashRecord {
                timestamp: local_noon(2),
                hash: "next day".into(),
            },
        ];
        for record in records.iter().cloned() {
            ledger.append_screenshot_hash(record).await?;
        }

        let day_one = ledger.screenshot_hashes_for(date(1)).await?;
        assert_eq!(day_one, vec![records[1].clone(), records[0].clone()]);
        assert_eq!(
            ledger.last_screenshot_hash().await?,
            Some(records[2].clone())
        );
        Ok(())
    }
}
