pub use self::{
    block_locator::{BlockTimestampLocator, Located},
    chain::{
        ChainProvider, LiveFeed, LiveMessage, LogQuery, ProviderFactory,
        Transport,
    },
    database::DatabasePool,
    event::LiveEventSubscriber,
    failover::{FailoverController, FailoverOutcome, TransportState},
    rpc::{RpcFactory, RpcProvider},
    sink::EventSink,
    synchronization::{BackfillReport, HistoricalBackfillEngine, RateLimitWindow},
};

mod block_locator;
mod chain;
mod database;
mod event;
mod failover;
mod rpc;
mod sink;
mod synchronization;
