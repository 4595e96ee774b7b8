//! Composition root of the pipeline: resume cursors, backfill passes, the
//! live subscription and the heartbeat and redundancy timers.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::{
    task::JoinSet,
    time::{interval, timeout, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    configuration::Config,
    error::Error,
    futures_set::join_contained,
    handler::EventHandler,
    model::HistoryStream,
    provider::{
        BackfillReport, BlockTimestampLocator, ChainProvider, EventSink,
        FailoverController, HistoricalBackfillEngine, LiveEventSubscriber,
        LogQuery, ProviderFactory, Transport,
    },
    types::{EventCatalog, EventKind},
};

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub chain_id: u64,
    pub history_floor: DateTime<Utc>,
    pub heartbeat_interval: Duration,
    pub redundancy_interval: Duration,
    pub probe_timeout: Duration,
    pub reset_threshold_min: u32,
    pub reset_threshold_max: u32,
    /// Bound on one-shot startup calls.
    pub init_timeout: Duration,
}

impl IngestionSettings {
    /// Drawn once per process so restarts of a fleet spread out.
    pub fn reset_threshold(&self) -> u32 {
        rand::thread_rng()
            .gen_range(self.reset_threshold_min..=self.reset_threshold_max)
    }
}

impl From<&Config> for IngestionSettings {
    fn from(config: &Config) -> Self {
        Self {
            chain_id: config.chain_id,
            history_floor: config.history_floor,
            heartbeat_interval: config.heartbeat_interval(),
            redundancy_interval: config.redundancy_interval(),
            probe_timeout: config.ws_probe_timeout(),
            reset_threshold_min: config.reset_threshold_min,
            reset_threshold_max: config.reset_threshold_max,
            init_timeout: config.timeout(),
        }
    }
}

/// Resume point per stream. Values never move backwards and never fall
/// below the history floor.
#[derive(Debug, Clone)]
pub struct CursorBook {
    floor: DateTime<Utc>,
    cursors: BTreeMap<HistoryStream, DateTime<Utc>>,
}

impl CursorBook {
    pub fn new(floor: DateTime<Utc>) -> Self {
        Self {
            floor,
            cursors: BTreeMap::new(),
        }
    }

    pub fn get(&self, stream: &HistoryStream) -> DateTime<Utc> {
        self.cursors
            .get(stream)
            .copied()
            .map_or(self.floor, |cursor| cursor.max(self.floor))
    }

    /// Returns whether the cursor moved.
    pub fn advance(&mut self, stream: HistoryStream, at: DateTime<Utc>) -> bool {
        match self.cursors.get(&stream) {
            Some(current) if *current >= at => false,
            _ => {
                self.cursors.insert(stream, at);
                true
            },
        }
    }

    /// The combined primary filter restarts from its most lagging stream.
    pub fn primary_since(&self) -> DateTime<Utc> {
        HistoryStream::PRIMARY
            .iter()
            .map(|stream| self.get(stream))
            .min()
            .unwrap_or(self.floor)
    }
}

/// One independently contained backfill sub-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillTarget {
    Primary,
    Transfers(Address),
}

impl fmt::Display for BackfillTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackfillTarget::Primary => write!(f, "primary"),
            BackfillTarget::Transfers(token) => {
                write!(f, "transfers/{:#x}", token)
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub completed: Vec<(BackfillTarget, BackfillReport)>,
    pub failed: Vec<(BackfillTarget, String)>,
}

impl PassReport {
    pub fn inserted(&self) -> usize {
        self.completed
            .iter()
            .map(|(_, report)| report.handled.inserted)
            .sum()
    }
}

pub struct Ingestion {
    settings: IngestionSettings,
    handler: Arc<EventHandler>,
    factory: Arc<dyn ProviderFactory>,
    engine: Arc<HistoricalBackfillEngine>,
    locator: BlockTimestampLocator,
    cursors: Mutex<CursorBook>,
}

impl Ingestion {
    pub fn new(
        settings: IngestionSettings,
        catalog: EventCatalog,
        sink: Arc<dyn EventSink>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        let handler = Arc::new(EventHandler::new(catalog, sink));
        let cursors = Mutex::new(CursorBook::new(settings.history_floor));

        Self {
            settings,
            engine: Arc::new(HistoricalBackfillEngine::new(handler.clone())),
            handler,
            factory,
            locator: BlockTimestampLocator::default(),
            cursors,
        }
    }

    pub fn cursor(&self, stream: &HistoryStream) -> Result<DateTime<Utc>, Error> {
        Ok(self.lock_cursors()?.get(stream))
    }

    pub async fn verify_chain(
        &self,
        provider: &dyn ChainProvider,
    ) -> Result<(), Error> {
        let actual =
            timeout(self.settings.init_timeout, provider.chain_id()).await??;

        if actual != self.settings.chain_id {
            return Err(Error::ChainIdMismatch {
                expected: self.settings.chain_id,
                actual,
            });
        }

        info!(chain_id = actual, endpoint = %provider.endpoint(), "Chain verified");

        Ok(())
    }

    fn streams(&self) -> Vec<HistoryStream> {
        let mut streams = HistoryStream::PRIMARY.to_vec();
        streams.extend(
            self.handler
                .catalog()
                .share_tokens
                .iter()
                .map(|token| HistoryStream::PeerTransfer(*token)),
        );
        streams
    }

    /// Reads the confirmed cursor of every stream from the sink.
    pub async fn refresh_cursors(&self) -> Result<(), Error> {
        let sink = self.handler.sink();
        let mut latest = Vec::new();

        for stream in self.streams() {
            if let Some(at) = sink.latest_cursor(&stream).await? {
                latest.push((stream, at));
            }
        }

        let mut cursors = self.lock_cursors()?;
        for (stream, at) in latest {
            if cursors.advance(stream, at) {
                debug!(%stream, cursor = %at, "Cursor advanced");
            }
        }

        Ok(())
    }

    /// One pass from the cursors (or `since_override`) to the chain head.
    /// The primary filter and every share token run as separate contained
    /// tasks, a failed task is reported and retried by the next pass.
    pub async fn backfill(
        &self,
        since_override: Option<DateTime<Utc>>,
    ) -> Result<PassReport, Error> {
        self.refresh_cursors().await?;
        let provider = self.factory.connect(Transport::Http).await?;
        let catalog = self.handler.catalog();

        let mut targets: Vec<(BackfillTarget, LogQuery, DateTime<Utc>)> =
            Vec::new();
        {
            let cursors = self.lock_cursors()?;
            targets.push((
                BackfillTarget::Primary,
                catalog.primary_query(&EventKind::PRIMARY),
                since_override.unwrap_or_else(|| cursors.primary_since()),
            ));
            for token in &catalog.share_tokens {
                targets.push((
                    BackfillTarget::Transfers(*token),
                    catalog.transfer_query(*token),
                    since_override.unwrap_or_else(|| {
                        cursors.get(&HistoryStream::PeerTransfer(*token))
                    }),
                ));
            }
        }

        let tasks = targets.into_iter().map(|(target, query, since)| {
            let provider = provider.clone();
            let engine = self.engine.clone();
            let locator = self.locator;

            let task = async move {
                let located = locator.locate(provider.as_ref(), since).await?;
                info!(
                    %target,
                    since = %since,
                    from_block = located.block,
                    to_block = located.head,
                    "Backfill range located"
                );
                engine
                    .filter(provider.as_ref(), &query, located.block, located.head)
                    .await
            };

            (target, task)
        });

        let mut report = PassReport::default();
        for (target, outcome) in join_contained(tasks, None).await {
            match outcome {
                Ok(done) => report.completed.push((target, done)),
                Err(e) => report.failed.push((target, e.to_string())),
            }
        }

        self.refresh_cursors().await?;

        if report.failed.is_empty() {
            info!(inserted = report.inserted(), "Backfill pass completed");
        } else {
            warn!(
                inserted = report.inserted(),
                failed = report.failed.len(),
                "Backfill pass completed with failures"
            );
        }

        Ok(report)
    }

    /// Runs until the failover controller asks for a restart or a timer
    /// task fails.
    pub async fn serve(self: Arc<Self>) -> Result<(), Error> {
        let provider = self.factory.connect(Transport::Http).await?;
        self.verify_chain(provider.as_ref()).await?;

        let threshold = self.settings.reset_threshold();
        let subscriber =
            Arc::new(LiveEventSubscriber::new(self.handler.clone()));
        let failover = Arc::new(
            FailoverController::start(
                self.factory.clone(),
                subscriber,
                threshold,
                self.settings.probe_timeout,
            )
            .await?,
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(Self::heartbeat(
            failover,
            self.settings.heartbeat_interval,
        ));
        tasks.spawn(self.clone().redundancy());

        while let Some(result) = tasks.join_next().await {
            result??;
        }

        Ok(())
    }

    async fn heartbeat(
        failover: Arc<FailoverController>,
        every: Duration,
    ) -> Result<(), Error> {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        let mut checks = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let failover = failover.clone();
                    checks.spawn(async move { failover.check().await });
                },
                Some(joined) = checks.join_next() => match joined? {
                    Ok(outcome) => debug!(
                        ?outcome,
                        state = %failover.state(),
                        resets = failover.reset_count(),
                        "Heartbeat checked"
                    ),
                    Err(Error::RestartRequired(resets)) => {
                        error!(
                            resets,
                            threshold = failover.reset_threshold(),
                            "Reset threshold reached, exiting for restart"
                        );
                        return Err(Error::RestartRequired(resets));
                    },
                    Err(e) => warn!("Heartbeat check failed: {}", e),
                },
            }
        }
    }

    /// The first tick is the startup backfill.
    async fn redundancy(self: Arc<Self>) -> Result<(), Error> {
        let mut ticker = interval(self.settings.redundancy_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.backfill(None).await {
                error!("Backfill pass failed: {}", e);
            }
        }
    }

    fn lock_cursors(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, CursorBook>, Error> {
        self.cursors
            .lock()
            .map_err(|e| Error::TaskError(format!("Cursor lock poisoned: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::Record,
        testing::{self, MemorySink, MockChain, MockFactory, CHAIN_ID, TOKEN_A},
    };

    fn settings() -> IngestionSettings {
        IngestionSettings {
            chain_id: CHAIN_ID,
            history_floor: testing::at(0),
            heartbeat_interval: Duration::from_secs(60),
            redundancy_interval: Duration::from_secs(4 * 60 * 60),
            probe_timeout: Duration::from_secs(30),
            reset_threshold_min: 100,
            reset_threshold_max: 200,
            init_timeout: Duration::from_secs(20),
        }
    }

    fn ingestion(
        sink: Arc<MemorySink>,
        http: Vec<Arc<MockChain>>,
    ) -> Ingestion {
        Ingestion::new(
            settings(),
            testing::catalog(),
            sink,
            MockFactory::new(vec![], http),
        )
    }

    fn http_connections(factory: &MockFactory) -> usize {
        factory
            .connections()
            .iter()
            .filter(|transport| **transport == Transport::Http)
            .count()
    }

    #[test]
    fn cursor_book_never_moves_backwards() {
        let mut book = CursorBook::new(testing::at(0));
        assert_eq!(book.get(&HistoryStream::Trade), testing::at(0));

        assert!(book.advance(HistoryStream::Trade, testing::at(5)));
        assert!(!book.advance(HistoryStream::Trade, testing::at(3)));
        assert!(!book.advance(HistoryStream::Trade, testing::at(5)));
        assert_eq!(book.get(&HistoryStream::Trade), testing::at(5));

        // the floor wins over older cursors
        let mut late = CursorBook::new(testing::at(10));
        late.advance(HistoryStream::Liquidate, testing::at(2));
        assert_eq!(late.get(&HistoryStream::Liquidate), testing::at(10));
    }

    #[test]
    fn primary_pass_starts_at_the_most_lagging_stream() {
        let mut book = CursorBook::new(testing::at(0));
        for stream in HistoryStream::PRIMARY {
            book.advance(stream, testing::at(8));
        }
        book.advance(HistoryStream::OraclesSet, testing::at(3));
        assert_eq!(book.primary_since(), testing::at(8));

        let mut lagging = CursorBook::new(testing::at(0));
        lagging.advance(HistoryStream::Trade, testing::at(8));
        assert_eq!(lagging.primary_since(), testing::at(0));
    }

    #[test]
    fn reset_threshold_stays_within_bounds() {
        let settings = settings();
        for _ in 0..100 {
            let threshold = settings.reset_threshold();
            assert!((100..=200).contains(&threshold));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_persists_trades_and_skips_malformed_logs() {
        // 12s blocks from D0: 1h = block 300
        let chain = MockChain::with_head(2_000);
        chain.push_log(testing::trade_log(300, 1, 0));
        chain.push_log(testing::trade_log(600, 2, 0));
        chain.push_log(testing::malformed_trade_log(900, 4));
        chain.push_log(testing::trade_log(1_500, 3, 0));
        let sink = Arc::new(MemorySink::default());
        let ingestion = ingestion(sink.clone(), vec![chain.clone()]);

        let report = ingestion.backfill(None).await.unwrap();

        assert!(report.failed.is_empty());
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.inserted(), 3);

        let tx_hashes: Vec<String> =
            sink.records().iter().map(|r| r.tx_hash().to_owned()).collect();
        for (seed, block) in [(1, 300), (2, 600), (3, 1_500)] {
            let expected = format!("{:#x}", testing::tx_hash(seed, block));
            assert!(tx_hashes.contains(&expected));
        }
        assert!(sink.records().iter().all(|r| matches!(r, Record::Trade(_))));

        let skipped: usize = report
            .completed
            .iter()
            .map(|(_, done)| done.handled.skipped)
            .sum();
        assert_eq!(skipped, 1);
        assert_eq!(
            ingestion.cursor(&HistoryStream::Trade).unwrap(),
            testing::at(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_passes_keep_cursors_monotonic() {
        let chain = MockChain::with_head(2_000);
        chain.push_log(testing::trade_log(1_500, 3, 0));
        let sink = Arc::new(MemorySink::default());
        let ingestion =
            ingestion(sink.clone(), vec![chain.clone(), chain.clone()]);

        ingestion.backfill(None).await.unwrap();
        let first = ingestion.cursor(&HistoryStream::Trade).unwrap();

        chain.push_log(testing::trade_log(900, 5, 0));
        ingestion.backfill(Some(testing::at(0))).await.unwrap();
        let second = ingestion.cursor(&HistoryStream::Trade).unwrap();

        assert_eq!(first, testing::at(5));
        assert_eq!(second, first);
        assert_eq!(sink.len(), 2);
        assert_eq!(
            ingestion
                .cursor(&HistoryStream::PeerTransfer(TOKEN_A))
                .unwrap(),
            testing::at(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn redundancy_timer_repeats_the_startup_backfill() {
        let chain = MockChain::with_head(2_000);
        chain.push_log(testing::trade_log(300, 1, 0));
        let sink = Arc::new(MemorySink::default());
        let factory = MockFactory::new(vec![], vec![chain.clone(); 6]);
        let settings = IngestionSettings {
            heartbeat_interval: Duration::from_secs(24 * 60 * 60),
            ..settings()
        };
        let ingestion = Arc::new(Ingestion::new(
            settings,
            testing::catalog(),
            sink.clone(),
            factory.clone(),
        ));

        let serving = tokio::spawn(ingestion.clone().serve());

        // startup backfill is the first tick
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.len(), 1);
        // chain check, head source, first pass
        assert_eq!(http_connections(&factory), 3);

        chain.push_log(testing::trade_log(1_500, 3, 0));
        tokio::time::sleep(Duration::from_secs(4 * 60 * 60)).await;
        assert_eq!(sink.len(), 2);
        assert_eq!(http_connections(&factory), 4);
        assert_eq!(
            ingestion.cursor(&HistoryStream::Trade).unwrap(),
            testing::at(5)
        );

        assert!(!serving.is_finished());
        serving.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_check_keeps_heartbeat_running_until_restart() {
        let chain = MockChain::with_head(2_000);
        let recovered = MockChain::ws();
        recovered.set_responsive(true);
        // chain check, head source, startup pass; the rotation after the
        // silent websocket finds no endpoint left
        let factory = MockFactory::new(
            vec![MockChain::ws(), recovered],
            vec![chain.clone(); 3],
        );
        factory.fail_ws_once();
        let settings = IngestionSettings {
            reset_threshold_min: 1,
            reset_threshold_max: 1,
            ..settings()
        };
        let ingestion = Arc::new(Ingestion::new(
            settings,
            testing::catalog(),
            Arc::new(MemorySink::default()),
            factory.clone(),
        ));

        let result = timeout(Duration::from_secs(600), ingestion.serve()).await;

        assert!(matches!(result, Ok(Err(Error::RestartRequired(1)))));
        let websockets = factory
            .connections()
            .iter()
            .filter(|transport| **transport == Transport::Ws)
            .count();
        assert_eq!(websockets, 3);
    }

    #[tokio::test]
    async fn chain_id_mismatch_is_fatal() {
        let chain = MockChain::http();
        chain.set_chain_id(1);
        let ingestion =
            ingestion(Arc::new(MemorySink::default()), vec![chain.clone()]);

        assert!(matches!(
            ingestion.verify_chain(chain.as_ref()).await,
            Err(Error::ChainIdMismatch {
                expected: CHAIN_ID,
                actual: 1
            })
        ));
    }
}
