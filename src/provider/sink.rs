use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    model::{HistoryStream, Provenance, Record},
};

/// Idempotent persistence boundary shared by the live subscriber and the
/// backfill engine.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Stored provenance of the record with the same identity, if any.
    async fn provenance(
        &self,
        record: &Record,
    ) -> Result<Option<Provenance>, Error>;

    /// Inserts unless a record with the same identity exists. Returns
    /// whether a row was written.
    async fn insert(&self, record: &Record) -> Result<bool, Error>;

    /// Marks a live-collected record as backfill-confirmed. Returns whether
    /// a row changed.
    async fn confirm(&self, record: &Record) -> Result<bool, Error>;

    /// Latest timestamp among confirmed records of the stream.
    async fn latest_cursor(
        &self,
        stream: &HistoryStream,
    ) -> Result<Option<DateTime<Utc>>, Error>;
}
