use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::sleep;
use tracing::{info, warn};

use super::chain::{ChainProvider, LogQuery};
use crate::{
    error::Error,
    handler::{BlockTimes, EventHandler, HandleReport},
    helpers::{classify, ErrorClass},
};

pub const DEFAULT_WINDOW: u64 = 9_999;
pub const MIN_WINDOW: u64 = 100;
pub const REQUESTS_PER_PAUSE: u32 = 25;
pub const PAUSE: Duration = Duration::from_secs(10);
pub const WARMUP: Duration = Duration::from_millis(1_100);
pub const INITIAL_BACKOFF_SECS: u64 = 2;
pub const MAX_BACKOFF_SECS: u64 = 32;

/// Rate limiting state of one `filter` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub requests_in_window: u32,
    pub window_blocks: u64,
    pub backoff_secs: u64,
    pub failures: u32,
}

impl RateLimitWindow {
    pub fn new(window_blocks: u64) -> Self {
        Self {
            requests_in_window: 0,
            window_blocks,
            backoff_secs: INITIAL_BACKOFF_SECS,
            failures: 0,
        }
    }

    /// Counts a successful request. Returns `true` when the fixed window is
    /// used up and the caller has to pause.
    pub fn on_success(&mut self) -> bool {
        self.backoff_secs = INITIAL_BACKOFF_SECS;
        self.failures = 0;
        self.requests_in_window += 1;

        if self.requests_in_window >= REQUESTS_PER_PAUSE {
            self.requests_in_window = 0;
            return true;
        }

        false
    }

    /// Delay before retrying after a transient error, `None` once the
    /// capped delay has already been spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;

        if self.backoff_secs > MAX_BACKOFF_SECS {
            return None;
        }

        let delay = Duration::from_secs(self.backoff_secs);
        self.backoff_secs *= 2;

        Some(delay)
    }

    /// `max(MIN_WINDOW, round(window * 0.75))`. Returns `false` when the
    /// window cannot shrink any further.
    pub fn shrink(&mut self) -> bool {
        let shrunk = ((self.window_blocks as f64) * 0.75).round() as u64;
        let shrunk = shrunk.max(MIN_WINDOW);

        if shrunk == self.window_blocks {
            return false;
        }

        self.window_blocks = shrunk;
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub from_block: u64,
    pub to_block: u64,
    pub windows: usize,
    pub handled: HandleReport,
}

/// Paginated log retrieval with rate limiting and adaptive window size.
/// The window width survives across calls so a shrink sticks for later
/// passes.
pub struct HistoricalBackfillEngine {
    handler: Arc<EventHandler>,
    window_blocks: AtomicU64,
}

impl HistoricalBackfillEngine {
    pub fn new(handler: Arc<EventHandler>) -> Self {
        Self::with_window(handler, DEFAULT_WINDOW)
    }

    pub fn with_window(handler: Arc<EventHandler>, window_blocks: u64) -> Self {
        Self {
            handler,
            window_blocks: AtomicU64::new(window_blocks.max(MIN_WINDOW)),
        }
    }

    pub fn window_blocks(&self) -> u64 {
        self.window_blocks.load(Ordering::SeqCst)
    }

    /// Walks `[from_block, to_block]` in windows, decoding and persisting
    /// every log. Fails only when retries are exhausted.
    pub async fn filter(
        &self,
        provider: &dyn ChainProvider,
        query: &LogQuery,
        from_block: u64,
        to_block: u64,
    ) -> Result<BackfillReport, Error> {
        let mut report = BackfillReport {
            from_block,
            to_block,
            ..BackfillReport::default()
        };

        if from_block > to_block {
            return Ok(report);
        }

        sleep(WARMUP).await;

        let total = to_block - from_block + 1;
        let mut window = RateLimitWindow::new(self.window_blocks());
        let mut next_progress = 5;
        let mut from = from_block;

        info!(
            from_block,
            to_block,
            window = window.window_blocks,
            "Backfill started"
        );

        while from <= to_block {
            let to = from.saturating_add(window.window_blocks).min(to_block);

            match self.window(provider, query, from, to).await {
                Ok(handled) => {
                    report.windows += 1;
                    report.handled.merge(&handled);
                    from = to + 1;

                    let done = (to - from_block + 1) * 100 / total;
                    if done >= next_progress {
                        info!(
                            progress = done,
                            block = to,
                            inserted = report.handled.inserted,
                            "Backfill progress {}%",
                            done
                        );
                        next_progress = (done / 5 + 1) * 5;
                    }

                    if window.on_success() && from <= to_block {
                        info!("Request window used up, pausing {:?}", PAUSE);
                        sleep(PAUSE).await;
                    }
                },
                Err(e) => match classify(&e) {
                    ErrorClass::Capacity => {
                        let previous = window.window_blocks;
                        if !window.shrink() {
                            warn!(from, to, "Window at minimum: {}", e);
                            return Err(Error::PayloadTooLarge { from, to });
                        }
                        self.window_blocks
                            .store(window.window_blocks, Ordering::SeqCst);
                        warn!(
                            from,
                            to,
                            previous,
                            window = window.window_blocks,
                            "Payload too large, shrinking window"
                        );
                    },
                    ErrorClass::Transient => match window.next_backoff() {
                        Some(delay) => {
                            warn!(
                                from,
                                to,
                                delay = delay.as_secs(),
                                "Backfill request failed: {}",
                                e
                            );
                            sleep(delay).await;
                        },
                        None => {
                            return Err(Error::BackoffExhausted {
                                attempts: window.failures,
                                message: e.to_string(),
                            });
                        },
                    },
                },
            }
        }

        info!(
            from_block,
            to_block,
            windows = report.windows,
            inserted = report.handled.inserted,
            confirmed = report.handled.confirmed,
            skipped = report.handled.skipped,
            failed = report.handled.failed,
            "Backfill completed"
        );

        Ok(report)
    }

    async fn window(
        &self,
        provider: &dyn ChainProvider,
        query: &LogQuery,
        from: u64,
        to: u64,
    ) -> Result<HandleReport, Error> {
        let logs = provider.logs(&query.with_range(from, to)).await?;
        let mut times = BlockTimes::default();
        let mut handled = HandleReport::default();

        for log in &logs {
            self.handler
                .handle_log(provider, &mut times, log, false, &mut handled)
                .await?;
        }

        Ok(handled)
    }
}
