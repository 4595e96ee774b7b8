use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy::{
    eips::BlockNumberOrTag,
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log},
};
use anyhow::Context as _;
use async_trait::async_trait;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use super::chain::{
    ChainProvider, LiveFeed, LiveMessage, LogQuery, ProviderFactory, Transport,
};
use crate::{configuration::Config, error::Error};

/// Widest range one polling round asks for after a stall.
const MAX_POLL_RANGE: u64 = 2_000;

#[derive(Clone)]
pub struct RpcProvider {
    transport: Transport,
    endpoint: String,
    provider: DynProvider,
    poll_interval: Duration,
}

impl RpcProvider {
    pub fn http(url: &Url, poll_interval: Duration) -> Self {
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();

        Self {
            transport: Transport::Http,
            endpoint: url.host_str().unwrap_or_default().to_owned(),
            provider,
            poll_interval,
        }
    }

    pub async fn ws(url: &Url, poll_interval: Duration) -> Result<Self, Error> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(url.as_str()))
            .await
            .with_context(|| {
                format!("Unable to connect websocket {}", url.host_str().unwrap_or_default())
            })?
            .erased();

        Ok(Self {
            transport: Transport::Ws,
            endpoint: url.host_str().unwrap_or_default().to_owned(),
            provider,
            poll_interval,
        })
    }

    fn filter(query: &LogQuery) -> Filter {
        let mut filter = Filter::new()
            .address(query.addresses.clone())
            .event_signature(query.topics.clone());

        if let Some(from) = query.from_block {
            filter = filter.from_block(from);
        }

        if let Some(to) = query.to_block {
            filter = filter.to_block(to);
        }

        filter
    }

    /// Polling feed for transports without push subscriptions. The first
    /// round only reports the head; later rounds fetch logs for the blocks
    /// produced since the previous round.
    fn poll(&self, query: Option<LogQuery>) -> LiveFeed {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = PollState {
            provider: self.clone(),
            query,
            ticker,
            last: None,
            pending: VecDeque::new(),
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(message) = state.pending.pop_front() {
                    return Some((message, state));
                }

                state.ticker.tick().await;
                if let Err(e) = state.round().await {
                    warn!(
                        endpoint = %state.provider.endpoint,
                        "Polling round failed: {}", e
                    );
                }
            }
        })
        .boxed()
    }
}

struct PollState {
    provider: RpcProvider,
    query: Option<LogQuery>,
    ticker: Interval,
    last: Option<u64>,
    pending: VecDeque<LiveMessage>,
}

impl PollState {
    async fn round(&mut self) -> Result<(), Error> {
        let head = self.provider.block_number().await?;

        let Some(last) = self.last else {
            self.last = Some(head);
            self.pending.push_back(LiveMessage::Block(head));
            return Ok(());
        };

        if head <= last {
            return Ok(());
        }

        let from = last + 1;
        let to = head.min(last + MAX_POLL_RANGE);

        if let Some(query) = &self.query {
            let logs = self.provider.logs(&query.with_range(from, to)).await?;
            debug!(from, to, logs = logs.len(), "Polled logs");
            self.pending.extend(logs.into_iter().map(LiveMessage::Log));
        }

        self.pending.push_back(LiveMessage::Block(to));
        self.last = Some(to);

        Ok(())
    }
}

#[async_trait]
impl ChainProvider for RpcProvider {
    fn transport(&self) -> Transport {
        self.transport
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_owned()
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64, Error> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, Error> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await?;

        block.map(|block| block.header.timestamp).ok_or_else(|| {
            Error::ProviderError(format!("Block {} not found", number))
        })
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<Log>, Error> {
        Ok(self.provider.get_logs(&Self::filter(query)).await?)
    }

    async fn watch(&self, query: &LogQuery) -> Result<LiveFeed, Error> {
        match self.transport {
            Transport::Http => Ok(self.poll(Some(query.clone()))),
            Transport::Ws => {
                let blocks = self
                    .provider
                    .subscribe_blocks()
                    .await?
                    .into_stream()
                    .map(|header| LiveMessage::Block(header.number));
                let logs = self
                    .provider
                    .subscribe_logs(&Self::filter(query))
                    .await?
                    .into_stream()
                    .map(LiveMessage::Log);

                Ok(stream::select(blocks, logs).boxed())
            },
        }
    }

    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>, Error> {
        match self.transport {
            Transport::Http => Ok(self
                .poll(None)
                .filter_map(|message| async move {
                    match message {
                        LiveMessage::Block(number) => Some(number),
                        LiveMessage::Log(_) => None,
                    }
                })
                .boxed()),
            Transport::Ws => Ok(self
                .provider
                .subscribe_blocks()
                .await?
                .into_stream()
                .map(|header| header.number)
                .boxed()),
        }
    }
}

/// Round-robin over the endpoints configured for the chain. Every call
/// builds a new client so a stale endpoint is never reused in place.
#[derive(Debug)]
pub struct RpcFactory {
    http: Vec<Url>,
    ws: Vec<Url>,
    next_http: AtomicUsize,
    next_ws: AtomicUsize,
    poll_interval: Duration,
}

impl RpcFactory {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let endpoints = config.endpoints()?;

        Ok(Self {
            http: endpoints.http.clone(),
            ws: endpoints.ws.clone(),
            next_http: AtomicUsize::new(0),
            next_ws: AtomicUsize::new(0),
            poll_interval: Duration::from_millis(config.poll_interval),
        })
    }

    fn next<'a>(urls: &'a [Url], cursor: &AtomicUsize) -> Option<&'a Url> {
        if urls.is_empty() {
            return None;
        }
        let idx = cursor.fetch_add(1, Ordering::SeqCst) % urls.len();
        urls.get(idx)
    }
}

#[async_trait]
impl ProviderFactory for RpcFactory {
    async fn connect(
        &self,
        transport: Transport,
    ) -> Result<Arc<dyn ChainProvider>, Error> {
        match transport {
            Transport::Http => {
                let url =
                    Self::next(&self.http, &self.next_http).ok_or_else(|| {
                        Error::ConfigurationError(String::from(
                            "No http endpoint configured",
                        ))
                    })?;
                info!(endpoint = %url.host_str().unwrap_or_default(), "Http provider created");
                Ok(Arc::new(RpcProvider::http(url, self.poll_interval)))
            },
            Transport::Ws => {
                let url = Self::next(&self.ws, &self.next_ws).ok_or_else(|| {
                    Error::ConfigurationError(String::from(
                        "No websocket endpoint configured",
                    ))
                })?;
                let provider = RpcProvider::ws(url, self.poll_interval).await?;
                info!(endpoint = %url.host_str().unwrap_or_default(), "Websocket provider connected");
                Ok(Arc::new(provider))
            },
        }
    }
}
