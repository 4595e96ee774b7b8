use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::chain::{ChainProvider, LiveFeed, LiveMessage, LogQuery, Transport};
use crate::{
    error::Error,
    handler::{BlockTimes, EventHandler, HandleReport},
};

/// Blocks kept in the live timestamp cache.
const CACHED_BLOCKS: u64 = 64;

struct Listener {
    transport: Transport,
    endpoint: String,
    task: JoinHandle<()>,
}

/// Forwards live logs to the shared handlers, tagged as collected live, and
/// tracks the newest block seen on the current connection.
pub struct LiveEventSubscriber {
    handler: Arc<EventHandler>,
    query: LogQuery,
    last_seen: watch::Sender<u64>,
    listener: Mutex<Option<Listener>>,
}

impl LiveEventSubscriber {
    pub fn new(handler: Arc<EventHandler>) -> Self {
        let query = handler.catalog().live_query();
        let (last_seen, _) = watch::channel(0);

        Self {
            handler,
            query,
            last_seen,
            listener: Mutex::new(None),
        }
    }

    /// Binds the subscriber to `provider`. Any previous listener is dropped
    /// together with its connection.
    pub async fn listen(
        &self,
        provider: Arc<dyn ChainProvider>,
    ) -> Result<(), Error> {
        let feed = provider.watch(&self.query).await?;
        let transport = provider.transport();
        let endpoint = provider.endpoint();

        let task = tokio::spawn(Self::consume(
            self.handler.clone(),
            provider,
            feed,
            self.last_seen.clone(),
        ));

        let previous = self.lock_listener()?.replace(Listener {
            transport,
            endpoint: endpoint.to_owned(),
            task,
        });

        if let Some(previous) = previous {
            previous.task.abort();
            debug!(
                transport = %previous.transport,
                endpoint = %previous.endpoint,
                "Previous listener dropped"
            );
        }

        info!(%transport, %endpoint, "Listening for live events");

        Ok(())
    }

    /// Healthy while at most one block behind `head`.
    pub fn check_heartbeat(&self, head: u64) -> bool {
        self.last_seen() + 1 >= head
    }

    pub fn last_seen(&self) -> u64 {
        *self.last_seen.borrow()
    }

    pub fn transport(&self) -> Option<Transport> {
        self.lock_listener()
            .ok()
            .and_then(|listener| listener.as_ref().map(|l| l.transport))
    }

    pub fn stop(&self) {
        if let Ok(mut listener) = self.lock_listener() {
            if let Some(listener) = listener.take() {
                listener.task.abort();
            }
        }
    }

    fn lock_listener(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<Listener>>, Error> {
        self.listener
            .lock()
            .map_err(|e| Error::TaskError(format!("Listener lock poisoned: {}", e)))
    }

    async fn consume(
        handler: Arc<EventHandler>,
        provider: Arc<dyn ChainProvider>,
        mut feed: LiveFeed,
        last_seen: watch::Sender<u64>,
    ) {
        let mut times = BlockTimes::default();
        let mut report = HandleReport::default();

        while let Some(message) = feed.next().await {
            match message {
                LiveMessage::Block(number) => {
                    last_seen.send_if_modified(|seen| {
                        if number > *seen {
                            *seen = number;
                            return true;
                        }
                        false
                    });
                    times.evict_below(number.saturating_sub(CACHED_BLOCKS));
                },
                LiveMessage::Log(log) => {
                    if log.removed {
                        debug!(tx_hash = ?log.transaction_hash, "Ignoring removed log");
                        continue;
                    }

                    if let Err(e) = handler
                        .handle_log(
                            provider.as_ref(),
                            &mut times,
                            &log,
                            true,
                            &mut report,
                        )
                        .await
                    {
                        error!(
                            tx_hash = ?log.transaction_hash,
                            "Live event dropped: {}", e
                        );
                    }
                },
            }
        }

        warn!(
            transport = %provider.transport(),
            endpoint = %provider.endpoint(),
            inserted = report.inserted,
            "Live feed closed"
        );
    }
}

impl Drop for LiveEventSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}
