//! Per-event handlers shared by the backfill engine and the live
//! subscriber. Dispatch is an exhaustive match over [`EventPayload`], so a
//! new event kind does not compile until it has a handler.

use std::{collections::HashMap, sync::Arc};

use alloy::rpc::types::Log;
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::{
    error::Error,
    helpers::to_datetime,
    model::{Provenance, Record},
    provider::{ChainProvider, EventSink},
    types::{DecodedEvent, EventCatalog, EventPayload, LogMeta},
};

pub mod liquidate;
pub mod liquidity_added;
pub mod liquidity_removed;
pub mod liquidity_withdrawal_initiated;
pub mod p2p_transfer;
pub mod set_oracles;
pub mod trade;
pub mod update_margin_account;

/// Block timestamps resolved within one batch.
#[derive(Debug, Default)]
pub struct BlockTimes {
    cache: HashMap<u64, DateTime<Utc>>,
}

impl BlockTimes {
    pub async fn resolve(
        &mut self,
        provider: &dyn ChainProvider,
        meta: &LogMeta,
    ) -> Result<DateTime<Utc>, Error> {
        if let Some(at) = self.cache.get(&meta.block_number) {
            return Ok(*at);
        }

        let seconds = match meta.block_timestamp {
            Some(seconds) => seconds,
            None => provider.block_timestamp(meta.block_number).await?,
        };
        let at = to_datetime(seconds)?;
        self.cache.insert(meta.block_number, at);

        Ok(at)
    }

    /// Drops entries for blocks older than `block`.
    pub fn evict_below(&mut self, block: u64) {
        self.cache.retain(|number, _| *number >= block);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    Inserted,
    /// A live-collected record was confirmed by backfill.
    Confirmed,
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleReport {
    pub logs: usize,
    pub skipped: usize,
    pub inserted: usize,
    pub confirmed: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl HandleReport {
    pub fn merge(&mut self, other: &HandleReport) {
        self.logs += other.logs;
        self.skipped += other.skipped;
        self.inserted += other.inserted;
        self.confirmed += other.confirmed;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }

    fn count(&mut self, stored: Stored) {
        match stored {
            Stored::Inserted => self.inserted += 1,
            Stored::Confirmed => self.confirmed += 1,
            Stored::Duplicate => self.duplicates += 1,
        }
    }
}

/// Builds the records a decoded event persists as.
pub fn parse_records(
    event: &DecodedEvent,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Vec<Record>, Error> {
    let meta = &event.meta;
    let records = match &event.payload {
        EventPayload::Trade(item) => {
            vec![trade::parse(meta, item, at, collected_live)?]
        },
        EventPayload::Liquidate(item) => {
            vec![liquidate::parse(meta, item, at, collected_live)?]
        },
        EventPayload::UpdateMarginAccount(item) => {
            vec![update_margin_account::parse(meta, item, at, collected_live)?]
        },
        EventPayload::LiquidityAdded(item) => {
            vec![liquidity_added::parse(meta, item, at, collected_live)?]
        },
        EventPayload::LiquidityRemoved(item) => {
            liquidity_removed::parse(meta, item, at, collected_live)?.into()
        },
        EventPayload::LiquidityWithdrawalInitiated(item) => {
            vec![liquidity_withdrawal_initiated::parse(
                meta,
                item,
                at,
                collected_live,
            )?]
        },
        EventPayload::SetOracles(item) => {
            vec![set_oracles::parse(meta, item, at, collected_live)?]
        },
        EventPayload::P2PTransfer(item) => {
            vec![p2p_transfer::parse(meta, item, at, collected_live)?]
        },
    };

    Ok(records)
}

/// Insert-if-absent with provenance reconciliation. A backfill observation
/// of a live-only record confirms it, everything else collapses into the
/// stored row.
pub async fn store(
    sink: &dyn EventSink,
    record: &Record,
) -> Result<Stored, Error> {
    let stored = sink.provenance(record).await?;

    match (stored, record.collected_live()) {
        (None, collected_live) => {
            if sink.insert(record).await? {
                return Ok(Stored::Inserted);
            }

            // Lost a race against the other delivery path.
            if !collected_live && sink.confirm(record).await? {
                return Ok(Stored::Confirmed);
            }

            Ok(Stored::Duplicate)
        },
        (Some(Provenance::Live), false) => {
            if sink.confirm(record).await? {
                Ok(Stored::Confirmed)
            } else {
                Ok(Stored::Duplicate)
            }
        },
        (Some(_), _) => Ok(Stored::Duplicate),
    }
}

/// Decodes, timestamps and persists single logs.
pub struct EventHandler {
    catalog: EventCatalog,
    sink: Arc<dyn EventSink>,
}

impl EventHandler {
    pub fn new(catalog: EventCatalog, sink: Arc<dyn EventSink>) -> Self {
        Self { catalog, sink }
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Undecodable logs and failed inserts are logged and counted, only a
    /// failed block timestamp lookup is returned to the caller.
    pub async fn handle_log(
        &self,
        provider: &dyn ChainProvider,
        times: &mut BlockTimes,
        log: &Log,
        collected_live: bool,
        report: &mut HandleReport,
    ) -> Result<(), Error> {
        report.logs += 1;

        let event = match self.catalog.decode(log) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    tx_hash = ?log.transaction_hash,
                    block = ?log.block_number,
                    "Skipping log: {}", e
                );
                report.skipped += 1;
                return Ok(());
            },
        };

        let at = times.resolve(provider, &event.meta).await?;

        let records = match parse_records(&event, at, collected_live) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    tx_hash = %event.meta.tx_hash,
                    kind = %event.kind(),
                    "Skipping event: {}", e
                );
                report.skipped += 1;
                return Ok(());
            },
        };

        for record in &records {
            match store(self.sink.as_ref(), record).await {
                Ok(stored) => {
                    debug!(
                        tx_hash = record.tx_hash(),
                        stream = %record.stream(),
                        ?stored,
                        "Event handled"
                    );
                    report.count(stored);
                },
                Err(e) => {
                    error!(
                        tx_hash = record.tx_hash(),
                        stream = %record.stream(),
                        "Persisting event failed: {}", e
                    );
                    report.failed += 1;
                },
            }
        }

        Ok(())
    }
}
