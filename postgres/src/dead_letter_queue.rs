//! Dead letter queue for events the projection updater cannot decode.
//!
//! A poison message must not stall the consumer loop: after a decode
//! failure the event is parked here and the offset is committed, so the
//! stream keeps flowing while an operator investigates.

use chrono::{DateTime, Utc};
use patientcare_core::event::SerializedEvent;
use patientcare_core::store::StoreError;
use sqlx::{PgPool, Row};

/// Status of a parked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqStatus {
    /// Awaiting investigation or reprocessing.
    Pending,
    /// Successfully reprocessed or otherwise dealt with.
    Resolved,
    /// Permanently unfixable and abandoned.
    Discarded,
}

impl DlqStatus {
    /// Database string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse from the database string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(StoreError::Database(format!("invalid DLQ status: {s}"))),
        }
    }
}

/// A parked event plus its failure metadata.
#[derive(Debug, Clone)]
pub struct FailedEvent {
    /// Unique DLQ entry id.
    pub id: i64,
    /// Topic the event arrived on.
    pub topic: String,
    /// The undecodable or unprocessable event.
    pub event: SerializedEvent,
    /// Human-readable error message.
    pub error_message: String,
    /// When the event was parked.
    pub failed_at: DateTime<Utc>,
    /// Current status.
    pub status: DlqStatus,
    /// When the entry was resolved or discarded, if it was.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Notes recorded at resolution time.
    pub resolution_notes: Option<String>,
}

/// `PostgreSQL`-backed dead letter queue.
///
/// # Example
///
/// ```no_run
/// use patientcare_postgres::DeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
/// let pending = dlq.list_pending(100).await?;
/// println!("pending failures: {}", pending.len());
/// # Ok(())
/// # }
/// ```
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a DLQ over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Park a failed event.
    ///
    /// Returns the id of the new entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn add_entry(
        &self,
        topic: &str,
        event: &SerializedEvent,
        error_message: &str,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_events (topic, event_type, event_key, event_data, error_message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(topic)
        .bind(&event.event_type)
        .bind(&event.key)
        .bind(&event.data)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::warn!(
            dlq_id = id,
            topic = topic,
            event_type = %event.event_type,
            key = %event.key,
            error = error_message,
            "event added to dead letter queue"
        );

        metrics::counter!("patientcare.dlq.added", "topic" => topic.to_string()).increment(1);

        Ok(id)
    }

    /// List pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<FailedEvent>, StoreError> {
        #[allow(clippy::cast_possible_wrap)] // limits are far below i64::MAX
        let rows = sqlx::query(
            r"
            SELECT id, topic, event_type, event_key, event_data, error_message,
                   failed_at, status, resolved_at, resolution_notes
            FROM failed_events
            WHERE status = 'pending'
            ORDER BY failed_at ASC
            LIMIT $1
            ",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_failed_event).collect()
    }

    /// Mark an entry as resolved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn mark_resolved(&self, id: i64, notes: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE failed_events
            SET status = 'resolved', resolved_at = NOW(), resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(dlq_id = id, "DLQ entry marked as resolved");
        metrics::counter!("patientcare.dlq.resolved").increment(1);

        Ok(())
    }

    /// Mark an entry as permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE failed_events
            SET status = 'discarded', resolved_at = NOW(), resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::warn!(dlq_id = id, reason = reason, "DLQ entry marked as discarded");
        metrics::counter!("patientcare.dlq.discarded").increment(1);

        Ok(())
    }

    /// Count of pending entries, for health checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_events WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count)
    }

    fn row_to_failed_event(row: &sqlx::postgres::PgRow) -> Result<FailedEvent, StoreError> {
        let status_str: String = row.get("status");
        let status = DlqStatus::parse(&status_str)?;

        Ok(FailedEvent {
            id: row.get("id"),
            topic: row.get("topic"),
            event: SerializedEvent::new(
                row.get("event_type"),
                row.get("event_data"),
                row.get("event_key"),
            ),
            error_message: row.get("error_message"),
            failed_at: row.get("failed_at"),
            status,
            resolved_at: row.get("resolved_at"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in &[DlqStatus::Pending, DlqStatus::Resolved, DlqStatus::Discarded] {
            let parsed = DlqStatus::parse(status.as_str()).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(DlqStatus::parse("processing-backwards").is_err());
    }
}
