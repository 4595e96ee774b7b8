use std::{fmt, sync::Arc};

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Ws,
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Ws => write!(f, "ws"),
            Transport::Http => write!(f, "http"),
        }
    }
}

/// Address and topic0 filter, optionally bounded to an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub addresses: Vec<Address>,
    pub topics: Vec<B256>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogQuery {
    pub fn new(addresses: Vec<Address>, topics: Vec<B256>) -> Self {
        Self {
            addresses,
            topics,
            from_block: None,
            to_block: None,
        }
    }

    pub fn with_range(&self, from_block: u64, to_block: u64) -> Self {
        Self {
            from_block: Some(from_block),
            to_block: Some(to_block),
            ..self.clone()
        }
    }

    pub fn matches(&self, log: &Log) -> bool {
        let address = log.address();
        let topic = log.topics().first();
        let in_range = match log.block_number {
            Some(n) => {
                self.from_block.map_or(true, |from| n >= from)
                    && self.to_block.map_or(true, |to| n <= to)
            },
            None => true,
        };

        (self.addresses.is_empty() || self.addresses.contains(&address))
            && topic.is_some_and(|t| self.topics.is_empty() || self.topics.contains(t))
            && in_range
    }
}

#[derive(Debug, Clone)]
pub enum LiveMessage {
    Block(u64),
    Log(Log),
}

pub type LiveFeed = BoxStream<'static, LiveMessage>;

/// One upstream node connection.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn transport(&self) -> Transport;

    /// Endpoint label used in logs.
    fn endpoint(&self) -> String;

    async fn chain_id(&self) -> Result<u64, Error>;

    async fn block_number(&self) -> Result<u64, Error>;

    async fn block_timestamp(&self, number: u64) -> Result<u64, Error>;

    async fn logs(&self, query: &LogQuery) -> Result<Vec<Log>, Error>;

    /// Live block numbers and matching logs. Dropping the feed releases the
    /// underlying subscriptions.
    async fn watch(&self, query: &LogQuery) -> Result<LiveFeed, Error>;

    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>, Error>;
}

/// Creates fresh connections, rotating through the configured endpoints.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn connect(
        &self,
        transport: Transport,
    ) -> Result<Arc<dyn ChainProvider>, Error>;
}
