use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use futures::StreamExt;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{
    chain::{ChainProvider, ProviderFactory, Transport},
    event::LiveEventSubscriber,
};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    OnWs,
    OnHttp,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportState::OnWs => write!(f, "ON_WS"),
            TransportState::OnHttp => write!(f, "ON_HTTP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverOutcome {
    Healthy,
    /// Another check was still running.
    Skipped,
    SwitchedToHttp,
    RestoredWs,
    RotatedHttp,
}

/// Resets the running flag even when the check future is dropped midway.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Supervises the live connection. A stale websocket is replaced by HTTP
/// polling; while on HTTP every stale check probes a fresh websocket and
/// otherwise rotates to the next HTTP endpoint.
pub struct FailoverController {
    factory: Arc<dyn ProviderFactory>,
    subscriber: Arc<LiveEventSubscriber>,
    head: RwLock<Arc<dyn ChainProvider>>,
    state: RwLock<TransportState>,
    running: AtomicBool,
    reset_count: AtomicU32,
    reset_threshold: u32,
    probe_timeout: Duration,
}

impl FailoverController {
    /// Connects the head source and binds the subscriber, preferring a
    /// websocket.
    pub async fn start(
        factory: Arc<dyn ProviderFactory>,
        subscriber: Arc<LiveEventSubscriber>,
        reset_threshold: u32,
        probe_timeout: Duration,
    ) -> Result<Self, Error> {
        let head = factory.connect(Transport::Http).await?;

        let state = match factory.connect(Transport::Ws).await {
            Ok(ws) => match subscriber.listen(ws).await {
                Ok(()) => TransportState::OnWs,
                Err(e) => {
                    warn!("Websocket subscription failed, using http: {}", e);
                    subscriber.listen(head.clone()).await?;
                    TransportState::OnHttp
                },
            },
            Err(e) => {
                warn!("Websocket unavailable, using http: {}", e);
                subscriber.listen(head.clone()).await?;
                TransportState::OnHttp
            },
        };

        info!(%state, reset_threshold, "Failover controller started");

        Ok(Self {
            factory,
            subscriber,
            head: RwLock::new(head),
            state: RwLock::new(state),
            running: AtomicBool::new(false),
            reset_count: AtomicU32::new(0),
            reset_threshold,
            probe_timeout,
        })
    }

    pub fn state(&self) -> TransportState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(TransportState::OnHttp)
    }

    pub fn reset_count(&self) -> u32 {
        self.reset_count.load(Ordering::SeqCst)
    }

    pub fn reset_threshold(&self) -> u32 {
        self.reset_threshold
    }

    /// One heartbeat round. Returns [`Error::RestartRequired`] once the
    /// websocket was restored `reset_threshold` times, the process is
    /// expected to exit and be restarted by its supervisor.
    pub async fn check(&self) -> Result<FailoverOutcome, Error> {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            return Ok(FailoverOutcome::Skipped);
        };

        let state = self.state();
        let head_reachable = match self.head_provider()?.block_number().await {
            Ok(head) => {
                if self.subscriber.check_heartbeat(head) {
                    return Ok(FailoverOutcome::Healthy);
                }

                warn!(
                    %state,
                    head,
                    last_seen = self.subscriber.last_seen(),
                    "Heartbeat stale"
                );
                true
            },
            Err(e) => {
                warn!(%state, "Head query failed, heartbeat counted as stale: {}", e);
                false
            },
        };

        match state {
            TransportState::OnWs => {
                self.rotate_http().await?;
                self.set_state(TransportState::OnHttp)?;
                info!("Switched live ingestion to http");

                Ok(FailoverOutcome::SwitchedToHttp)
            },
            TransportState::OnHttp => match self.probe_ws().await {
                Some(ws) => {
                    self.subscriber.listen(ws).await?;
                    self.set_state(TransportState::OnWs)?;
                    if !head_reachable {
                        self.replace_head().await?;
                    }
                    let resets =
                        self.reset_count.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(
                        resets,
                        threshold = self.reset_threshold,
                        "Restored websocket"
                    );

                    if resets >= self.reset_threshold {
                        return Err(Error::RestartRequired(resets));
                    }

                    Ok(FailoverOutcome::RestoredWs)
                },
                None => {
                    self.rotate_http().await?;
                    info!("Websocket still down, rotated http provider");

                    Ok(FailoverOutcome::RotatedHttp)
                },
            },
        }
    }

    /// Moves both the live feed and the head source to the next HTTP
    /// endpoint.
    async fn rotate_http(&self) -> Result<(), Error> {
        let http = self.factory.connect(Transport::Http).await?;
        self.subscriber.listen(http.clone()).await?;
        self.set_head(http)
    }

    async fn replace_head(&self) -> Result<(), Error> {
        let http = self.factory.connect(Transport::Http).await?;
        info!(endpoint = %http.endpoint(), "Replaced unreachable head provider");
        self.set_head(http)
    }

    fn set_head(&self, provider: Arc<dyn ChainProvider>) -> Result<(), Error> {
        *self.head.write().map_err(|e| {
            Error::TaskError(format!("Head provider lock poisoned: {}", e))
        })? = provider;

        Ok(())
    }

    /// A fresh websocket counts as recovered once it delivers a block
    /// within the probe timeout.
    async fn probe_ws(&self) -> Option<Arc<dyn ChainProvider>> {
        let probe = async {
            let ws = self.factory.connect(Transport::Ws).await?;
            let mut blocks = ws.subscribe_blocks().await?;
            match blocks.next().await {
                Some(block) => Ok((ws, block)),
                None => Err(Error::ProviderError(String::from(
                    "Block subscription closed",
                ))),
            }
        };

        match timeout(self.probe_timeout, probe).await {
            Ok(Ok((ws, block))) => {
                info!(block, endpoint = %ws.endpoint(), "Websocket probe succeeded");
                Some(ws)
            },
            Ok(Err(e)) => {
                warn!("Websocket probe failed: {}", e);
                None
            },
            Err(_) => {
                warn!(
                    timeout = self.probe_timeout.as_secs(),
                    "Websocket probe timed out"
                );
                None
            },
        }
    }

    fn head_provider(&self) -> Result<Arc<dyn ChainProvider>, Error> {
        self.head.read().map(|head| head.clone()).map_err(|e| {
            Error::TaskError(format!("Head provider lock poisoned: {}", e))
        })
    }

    fn set_state(&self, state: TransportState) -> Result<(), Error> {
        *self.state.write().map_err(|e| {
            Error::TaskError(format!("State lock poisoned: {}", e))
        })? = state;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        handler::EventHandler,
        provider::LiveMessage,
        testing::{self, MemorySink, MockChain, MockFactory},
    };

    const PROBE: Duration = Duration::from_secs(30);

    fn subscriber() -> Arc<LiveEventSubscriber> {
        Arc::new(LiveEventSubscriber::new(Arc::new(EventHandler::new(
            testing::catalog(),
            Arc::new(MemorySink::default()),
        ))))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn stale_websocket_switches_to_http_then_recovers() {
        let stalled_ws = MockChain::ws();
        let head = MockChain::http();
        let polling = MockChain::http();
        let recovered_ws = MockChain::ws();
        recovered_ws.set_responsive(true);

        let factory = MockFactory::new(
            vec![stalled_ws.clone(), recovered_ws.clone()],
            vec![head.clone(), polling.clone()],
        );
        let subscriber = subscriber();
        let controller =
            FailoverController::start(factory.clone(), subscriber.clone(), 150, PROBE)
                .await
                .unwrap();
        assert_eq!(controller.state(), TransportState::OnWs);

        stalled_ws.emit(LiveMessage::Block(10));
        head.set_head(11);
        settle().await;
        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::Healthy);

        // websocket stalls while the chain moves on
        head.set_head(20);
        polling.set_head(20);
        assert_eq!(
            controller.check().await.unwrap(),
            FailoverOutcome::SwitchedToHttp
        );
        assert_eq!(controller.state(), TransportState::OnHttp);
        assert_eq!(subscriber.transport(), Some(Transport::Http));

        // polling provider falls behind as well
        polling.set_head(30);
        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::RestoredWs);
        assert_eq!(controller.state(), TransportState::OnWs);
        assert_eq!(controller.reset_count(), 1);
        assert_eq!(subscriber.transport(), Some(Transport::Ws));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_websocket_probe_rotates_http() {
        let factory = MockFactory::new(
            vec![MockChain::ws(), MockChain::ws()],
            vec![MockChain::http(), MockChain::http(), MockChain::http()],
        );
        let subscriber = subscriber();
        let controller =
            FailoverController::start(factory.clone(), subscriber.clone(), 150, PROBE)
                .await
                .unwrap();

        factory.http(0).set_head(50);
        factory.http(1).set_head(50);
        assert_eq!(
            controller.check().await.unwrap(),
            FailoverOutcome::SwitchedToHttp
        );

        factory.http(1).set_head(60);
        assert_eq!(
            controller.check().await.unwrap(),
            FailoverOutcome::RotatedHttp
        );
        assert_eq!(controller.state(), TransportState::OnHttp);
        assert_eq!(controller.reset_count(), 0);
        assert_eq!(
            factory.connections(),
            vec![
                Transport::Http,
                Transport::Ws,
                Transport::Http,
                Transport::Ws,
                Transport::Http,
            ]
        );
    }

    #[tokio::test]
    async fn reaching_the_reset_threshold_requires_restart() {
        let recovered = MockChain::ws();
        recovered.set_responsive(true);
        let head = MockChain::http();
        let factory = MockFactory::new(vec![recovered], vec![head.clone()]);
        factory.fail_ws_once();

        let controller =
            FailoverController::start(factory.clone(), subscriber(), 1, PROBE)
                .await
                .unwrap();
        assert_eq!(controller.state(), TransportState::OnHttp);

        head.set_head(40);
        assert!(matches!(
            controller.check().await,
            Err(Error::RestartRequired(1))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_head_rotates_http() {
        let dead = MockChain::http();
        dead.set_unreachable(true);
        let spare = MockChain::http();
        let factory =
            MockFactory::new(vec![MockChain::ws()], vec![dead, spare.clone()]);
        factory.fail_ws_once();
        let subscriber = subscriber();

        let controller =
            FailoverController::start(factory.clone(), subscriber.clone(), 150, PROBE)
                .await
                .unwrap();
        assert_eq!(controller.state(), TransportState::OnHttp);

        assert_eq!(
            controller.check().await.unwrap(),
            FailoverOutcome::RotatedHttp
        );
        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::Healthy);
        assert_eq!(
            factory.connections(),
            vec![
                Transport::Http,
                Transport::Ws,
                Transport::Ws,
                Transport::Http,
            ]
        );
        assert_eq!(subscriber.transport(), Some(Transport::Http));
    }

    #[tokio::test]
    async fn unreachable_head_on_websocket_switches_to_http() {
        let ws = MockChain::ws();
        let dead = MockChain::http();
        dead.set_unreachable(true);
        let spare = MockChain::http();
        let factory = MockFactory::new(vec![ws], vec![dead, spare]);
        let controller =
            FailoverController::start(factory.clone(), subscriber(), 150, PROBE)
                .await
                .unwrap();
        assert_eq!(controller.state(), TransportState::OnWs);

        assert_eq!(
            controller.check().await.unwrap(),
            FailoverOutcome::SwitchedToHttp
        );
        assert_eq!(controller.state(), TransportState::OnHttp);
        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::Healthy);
    }

    #[tokio::test]
    async fn restored_websocket_replaces_unreachable_head() {
        let recovered = MockChain::ws();
        recovered.set_responsive(true);
        let dead = MockChain::http();
        dead.set_unreachable(true);
        let factory = MockFactory::new(
            vec![recovered],
            vec![dead, MockChain::http()],
        );
        factory.fail_ws_once();
        let controller =
            FailoverController::start(factory.clone(), subscriber(), 150, PROBE)
                .await
                .unwrap();

        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::RestoredWs);
        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::Healthy);
        assert_eq!(
            factory.connections(),
            vec![
                Transport::Http,
                Transport::Ws,
                Transport::Ws,
                Transport::Http,
            ]
        );
    }

    #[tokio::test]
    async fn overlapping_checks_are_skipped() {
        let factory = MockFactory::new(vec![MockChain::ws()], vec![MockChain::http()]);
        let controller =
            FailoverController::start(factory, subscriber(), 150, PROBE)
                .await
                .unwrap();

        controller.running.store(true, Ordering::SeqCst);
        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::Skipped);
        controller.running.store(false, Ordering::SeqCst);

        assert_eq!(controller.check().await.unwrap(), FailoverOutcome::Healthy);
        assert!(!controller.running.load(Ordering::SeqCst));
    }
}
