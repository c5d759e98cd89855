//! Queue operations: submission with dedup, status lookup, the worker
//! claim protocol, and completion transitions.
//!
//! Multiple rows may share a key; the row with the greatest index is the
//! authoritative generation. All transitions out of the incomplete set
//! {Pending, InProgress} are single conditional updates, so a stale or
//! duplicate call against an already-terminal row is a harmless no-op.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{BatchRequest, BatchStatus, DEFAULT_ESTIMATED_TIME, QueueEntry, Status};

const SELECT_COLUMNS: &str =
    r#"SELECT "index", key, status, requestUri, params, estimatedTime, startTime FROM queue"#;

impl super::Db {
    /// Submit a request for processing.
    ///
    /// If no entry exists for the key, or the latest generation is Failed,
    /// a fresh Pending entry is inserted. Otherwise the existing status is
    /// returned unchanged: already-queued, in-flight, or completed work is
    /// never re-enqueued by `submit` (use [`resubmit`](Self::resubmit)).
    pub async fn submit(&self, request: &BatchRequest) -> Result<BatchStatus> {
        let key = request.key();
        match self.latest_entry(key).await? {
            Some(entry) if entry.status != Status::Failed => {
                debug!(key, status = %entry.status, "submit deduplicated");
                Ok(entry.to_status())
            }
            _ => {
                let entry = insert_pending_on(self.pool(), request).await?;
                info!(key, index = entry.index, "submit queued new entry");
                Ok(entry.to_status())
            }
        }
    }

    /// Force a fresh Pending entry for the request's key.
    ///
    /// Deletes any incomplete entries for the key and inserts a new
    /// generation, in one transaction so a crash cannot leave the key with
    /// zero or two Pending rows. Completed and Failed history is preserved.
    pub async fn resubmit(&self, request: &BatchRequest) -> Result<BatchStatus> {
        let key = request.key();
        let mut tx = self.pool().begin().await?;
        let removed = sqlx::query("DELETE FROM queue WHERE key = ?1 AND status IN (?2, ?3)")
            .bind(key)
            .bind(Status::Pending.as_str())
            .bind(Status::InProgress.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let entry = insert_pending_on(&mut *tx, request).await?;
        tx.commit().await?;
        info!(key, removed, index = entry.index, "resubmit replaced incomplete entries");
        Ok(entry.to_status())
    }

    /// Status of the latest generation for a key, or Unknown if the key has
    /// no entry at all.
    pub async fn get_status(&self, key: &str) -> Result<BatchStatus> {
        Ok(self
            .latest_entry(key)
            .await?
            .map_or_else(|| BatchStatus::unknown(key), |entry| entry.to_status()))
    }

    /// Snapshot of all outstanding work, oldest first.
    ///
    /// Each status carries its position in the queue and a completion
    /// estimate accumulated over the entries ahead of it.
    pub async fn get_queue(&self) -> Result<Vec<BatchStatus>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS} WHERE status IN (?1, ?2) ORDER BY "index" ASC"#
        ))
        .bind(Status::Pending.as_str())
        .bind(Status::InProgress.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut cumulative = Duration::ZERO;
        let mut snapshot = Vec::with_capacity(rows.len());
        for (position, row) in rows.into_iter().enumerate() {
            let entry = row.try_into_entry()?;
            cumulative += entry.estimated_time.unwrap_or(DEFAULT_ESTIMATED_TIME);
            let mut status = entry.to_status();
            status.position_in_queue = Some(position + 1);
            status.eta = Some(cumulative);
            snapshot.push(status);
        }
        Ok(snapshot)
    }

    /// The request payload of the latest generation for a key, or None if
    /// the key has no entry.
    pub async fn find_request(&self, key: &str) -> Result<Option<BatchRequest>> {
        Ok(self.latest_entry(key).await?.map(|entry| entry.to_request()))
    }

    /// Claim the next request to process, waiting up to `timeout` for one
    /// to arrive.
    ///
    /// Entries are served strictly in ascending index order over the
    /// currently-Pending set. The claimed entry is stamped InProgress with
    /// a start time before being returned. Returns None if nothing became
    /// claimable within the timeout.
    pub async fn next_request(&self, timeout: Duration) -> Result<Option<BatchRequest>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(entry) = self.claim_oldest_pending().await? {
                info!(key = %entry.key, index = entry.index, "claimed next request");
                return Ok(Some(entry.to_request()));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.options().poll_interval.min(deadline - now)).await;
        }
    }

    /// [`next_request`](Self::next_request) with the configured default
    /// timeout.
    pub async fn next_request_default(&self) -> Result<Option<BatchRequest>> {
        self.next_request(self.options().default_timeout).await
    }

    /// Claim the single oldest Pending entry, if any.
    ///
    /// The candidate selection and the status rewrite are one statement, so
    /// two concurrent workers can never both claim the same row: the losing
    /// caller's subselect simply resolves to the next Pending row, and None
    /// means no Pending row existed at that instant.
    async fn claim_oldest_pending(&self) -> Result<Option<QueueEntry>> {
        let row: Option<QueueRow> = sqlx::query_as(
            r#"UPDATE queue SET status = ?1, startTime = ?2
               WHERE "index" = (SELECT "index" FROM queue WHERE status = ?3 ORDER BY "index" ASC LIMIT 1)
                 AND status = ?3
               RETURNING "index", key, status, requestUri, params, estimatedTime, startTime"#,
        )
        .bind(Status::InProgress.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(Status::Pending.as_str())
        .fetch_optional(self.pool())
        .await?;
        row.map(QueueRow::try_into_entry).transpose()
    }

    /// Mark the key's outstanding entry as completed, or delete it when
    /// configured with `delete_on_complete`. No-op if the key has no
    /// incomplete entry.
    pub async fn finish_request(&self, key: &str) -> Result<()> {
        if self.options().delete_on_complete {
            let removed = sqlx::query("DELETE FROM queue WHERE key = ?1 AND status IN (?2, ?3)")
                .bind(key)
                .bind(Status::Pending.as_str())
                .bind(Status::InProgress.as_str())
                .execute(self.pool())
                .await?
                .rows_affected();
            debug!(key, removed, "finish deleted entry");
            Ok(())
        } else {
            self.update_incomplete(key, Status::Completed).await
        }
    }

    /// Return the key's in-progress entry to the pending queue, e.g. after
    /// a worker crash. Also accepts an already-Pending entry as a no-op.
    pub async fn abort_request(&self, key: &str) -> Result<()> {
        self.update_incomplete(key, Status::Pending).await
    }

    /// Mark the key's outstanding entry as failed. A later `submit` for the
    /// same key will start a new generation.
    pub async fn fail_request(&self, key: &str) -> Result<()> {
        self.update_incomplete(key, Status::Failed).await
    }

    /// Delete Completed/Failed entries older than `cutoff`, bounding table
    /// growth.
    ///
    /// Not built yet; fails loudly rather than silently doing nothing.
    pub async fn remove_old_completed_requests(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        Err(crate::error::Error::Unimplemented(
            "remove_old_completed_requests",
        ))
    }

    async fn latest_entry(&self, key: &str) -> Result<Option<QueueEntry>> {
        let row: Option<QueueRow> = sqlx::query_as(&format!(
            r#"{SELECT_COLUMNS} WHERE key = ?1 ORDER BY "index" DESC LIMIT 1"#
        ))
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        row.map(QueueRow::try_into_entry).transpose()
    }

    /// The shared conditional transition: rewrite the key's entry to `to`
    /// only while it is still in the incomplete set.
    async fn update_incomplete(&self, key: &str, to: Status) -> Result<()> {
        let affected = sqlx::query("UPDATE queue SET status = ?1 WHERE key = ?2 AND status IN (?3, ?4)")
            .bind(to.as_str())
            .bind(key)
            .bind(Status::Pending.as_str())
            .bind(Status::InProgress.as_str())
            .execute(self.pool())
            .await?
            .rows_affected();
        if affected == 0 {
            debug!(key, to = %to, "transition matched no incomplete entry");
        } else {
            info!(key, to = %to, "transition");
        }
        Ok(())
    }
}

async fn insert_pending_on<'c, E>(executor: E, request: &BatchRequest) -> Result<QueueEntry>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    let row: (i64,) = sqlx::query_as(
        r#"INSERT INTO queue (key, status, requestUri, params, estimatedTime)
           VALUES (?1, ?2, ?3, ?4, ?5) RETURNING "index""#,
    )
    .bind(request.key())
    .bind(Status::Pending.as_str())
    .bind(request.request_uri())
    .bind(request.parameter_string())
    .bind(request.estimated_time().as_millis() as i64)
    .fetch_one(executor)
    .await?;

    Ok(QueueEntry {
        index: row.0,
        key: request.key().to_string(),
        status: Status::Pending,
        request_uri: request.request_uri().to_string(),
        params: request.parameter_string(),
        estimated_time: Some(request.estimated_time()),
        start_time: None,
    })
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct QueueRow {
    #[sqlx(rename = "index")]
    index: i64,
    key: String,
    status: String,
    #[sqlx(rename = "requestUri")]
    request_uri: String,
    params: Option<String>,
    #[sqlx(rename = "estimatedTime")]
    estimated_time: Option<i64>,
    #[sqlx(rename = "startTime")]
    start_time: Option<i64>,
}

impl QueueRow {
    /// Pure conversion from a row snapshot to the entry value.
    fn try_into_entry(self) -> Result<QueueEntry> {
        Ok(QueueEntry {
            index: self.index,
            status: self.status.parse()?,
            key: self.key,
            request_uri: self.request_uri,
            params: self.params.unwrap_or_default(),
            estimated_time: self.estimated_time.map(|ms| Duration::from_millis(ms as u64)),
            start_time: self
                .start_time
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }
}
