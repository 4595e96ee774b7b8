//! Scripted chain, factory and sink doubles shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use alloy::{
    primitives::{
        aliases::U24, keccak256, Address, Bytes, FixedBytes, LogData, B256,
        U256,
    },
    rpc::types::Log,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::sync::mpsc;

use crate::{
    error::Error,
    model::{HistoryStream, Provenance, Record},
    provider::{
        BlockTimestampLocator, ChainProvider, EventSink, LiveFeed,
        LiveMessage, Located, LogQuery, ProviderFactory, Transport,
    },
    types::{contract, EventCatalog},
};

pub const MANAGER: Address = Address::new([0x11; 20]);
pub const TOKEN_A: Address = Address::new([0x21; 20]);
pub const TOKEN_B: Address = Address::new([0x22; 20]);
pub const CHAIN_ID: u64 = 42_161;

/// Timestamp of block 0, also the history floor `D0` of the scenarios.
pub const GENESIS: i64 = 1_700_000_000;
pub const BLOCK_TIME: i64 = 12;

pub fn catalog() -> EventCatalog {
    EventCatalog::new(MANAGER, vec![TOKEN_A, TOKEN_B])
}

pub fn trader(seed: u8) -> Address {
    Address::with_last_byte(seed)
}

/// `D0 + hours`.
pub fn at(hours: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(GENESIS, 0).unwrap() + Duration::hours(hours)
}

pub fn tx_hash(seed: u8, block: u64) -> B256 {
    let mut preimage = vec![seed];
    preimage.extend_from_slice(&block.to_be_bytes());
    keccak256(preimage)
}

pub fn raw_log(
    address: Address,
    data: LogData,
    block: u64,
    tx_seed: u8,
    log_index: u64,
) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: None,
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(tx_hash(tx_seed, block)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

pub fn trade(seed: u8) -> contract::Trade {
    let trader = trader(seed);

    contract::Trade {
        perpetualId: U24::from(100_001u32),
        trader,
        positionId: FixedBytes::<16>::repeat_byte(seed),
        order: contract::Order {
            flags: 0x4000_0000,
            iPerpetualId: U24::from(100_001u32),
            brokerFeeTbps: 0,
            traderAddr: trader,
            brokerAddr: Address::ZERO,
            executorAddr: Address::repeat_byte(0x0e),
            fAmount: 18_446_744_073_709_551_616 * i128::from(seed),
            fLimitPrice: 0,
            fTriggerPrice: 0,
            iDeadline: 0,
            executionTimestamp: 0,
        },
        orderDigest: B256::repeat_byte(seed),
        newPositionSizeBC: 18_446_744_073_709_551_616,
        price: 55_340_232_221_128_654_848_000,
        fFeeCCY: 1_844_674_407_370_955,
        fPnlCCY: 0,
        fB2C: 18_446_744_073_709_551_616,
    }
}

pub fn trade_log(block: u64, seed: u8, log_index: u64) -> Log {
    raw_log(MANAGER, trade(seed).encode_log_data(), block, seed, log_index)
}

/// A trade whose body was cut short, decoding it fails.
pub fn malformed_trade_log(block: u64, seed: u8) -> Log {
    let mut log = trade_log(block, seed, 0);
    log.inner.data = LogData::new_unchecked(
        log.topics().to_vec(),
        Bytes::from(vec![0u8; 16]),
    );
    log
}

pub fn removal_log(block: u64, seed: u8) -> Log {
    let removed = contract::LiquidityRemoved {
        poolId: 1,
        user: trader(seed),
        tokenAmount: U256::from(2_000_000u64),
        shareAmount: U256::from(1_000_000u64),
    };

    raw_log(MANAGER, removed.encode_log_data(), block, seed, 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    PayloadTooLarge,
    RateLimited,
}

impl Failure {
    fn error(&self) -> Error {
        match self {
            Failure::PayloadTooLarge => {
                Error::ProviderError(String::from("413 Payload Too Large"))
            },
            Failure::RateLimited => {
                Error::ProviderError(String::from("429 Too Many Requests"))
            },
        }
    }
}

/// Chain with a block every [`BLOCK_TIME`] seconds from [`GENESIS`].
pub struct MockChain {
    transport: Transport,
    head: AtomicU64,
    chain_id: AtomicU64,
    responsive: AtomicBool,
    unreachable: AtomicBool,
    logs: Mutex<Vec<Log>>,
    failures: Mutex<VecDeque<Failure>>,
    always: Mutex<Option<Failure>>,
    ranges: Mutex<Vec<(u64, u64)>>,
    timestamp_calls: AtomicUsize,
    live: Mutex<Option<mpsc::UnboundedSender<LiveMessage>>>,
}

impl MockChain {
    fn new(transport: Transport, head: u64) -> Arc<Self> {
        Arc::new(Self {
            transport,
            head: AtomicU64::new(head),
            chain_id: AtomicU64::new(CHAIN_ID),
            responsive: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            logs: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
            ranges: Mutex::new(Vec::new()),
            timestamp_calls: AtomicUsize::new(0),
            live: Mutex::new(None),
        })
    }

    pub fn http() -> Arc<Self> {
        Self::new(Transport::Http, 0)
    }

    pub fn ws() -> Arc<Self> {
        Self::new(Transport::Ws, 0)
    }

    pub fn with_head(head: u64) -> Arc<Self> {
        Self::new(Transport::Http, head)
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    /// A responsive chain delivers its head right after `subscribe_blocks`.
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    /// An unreachable chain refuses every head query.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn time_of(&self, block: u64) -> DateTime<Utc> {
        DateTime::from_timestamp(GENESIS + BLOCK_TIME * block as i64, 0)
            .unwrap()
    }

    /// Newest block at or before `since`.
    pub fn block_at(&self, since: DateTime<Utc>) -> u64 {
        let elapsed = (since.timestamp() - GENESIS).max(0) / BLOCK_TIME;
        (elapsed as u64).min(self.head.load(Ordering::SeqCst))
    }

    pub async fn locate(&self, since: DateTime<Utc>) -> Located {
        BlockTimestampLocator::default()
            .locate(self, since)
            .await
            .unwrap()
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn fail_next(&self, failure: Failure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub fn fail_always(&self, failure: Failure) {
        *self.always.lock().unwrap() = Some(failure);
    }

    pub fn queried_ranges(&self) -> Vec<(u64, u64)> {
        self.ranges.lock().unwrap().clone()
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    /// Pushes a message into the feed returned by the latest `watch`.
    pub fn emit(&self, message: LiveMessage) {
        if let Some(sender) = self.live.lock().unwrap().as_ref() {
            let _ = sender.send(message);
        }
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    fn transport(&self) -> Transport {
        self.transport
    }

    fn endpoint(&self) -> String {
        format!("mock-{}", self.transport)
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn block_number(&self) -> Result<u64, Error> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::ProviderError(String::from("connection refused")));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, Error> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.time_of(number).timestamp() as u64)
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<Log>, Error> {
        let from = query.from_block.unwrap_or_default();
        let to = query
            .to_block
            .unwrap_or_else(|| self.head.load(Ordering::SeqCst));
        self.ranges.lock().unwrap().push((from, to));

        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure.error());
        }
        if let Some(failure) = self.always.lock().unwrap().as_ref() {
            return Err(failure.error());
        }

        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| query.matches(log))
            .cloned()
            .collect())
    }

    async fn watch(&self, _query: &LogQuery) -> Result<LiveFeed, Error> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.live.lock().unwrap() = Some(sender);

        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        })
        .boxed())
    }

    async fn subscribe_blocks(&self) -> Result<BoxStream<'static, u64>, Error> {
        if !self.responsive.load(Ordering::SeqCst) {
            return Ok(stream::pending().boxed());
        }

        let head = self.head.load(Ordering::SeqCst);
        Ok(stream::once(async move { head })
            .chain(stream::pending())
            .boxed())
    }
}

/// Hands out prepared chains in order, per transport.
pub struct MockFactory {
    ws: Vec<Arc<MockChain>>,
    http: Vec<Arc<MockChain>>,
    next_ws: AtomicUsize,
    next_http: AtomicUsize,
    fail_ws: AtomicBool,
    connections: Mutex<Vec<Transport>>,
}

impl MockFactory {
    pub fn new(ws: Vec<Arc<MockChain>>, http: Vec<Arc<MockChain>>) -> Arc<Self> {
        Arc::new(Self {
            ws,
            http,
            next_ws: AtomicUsize::new(0),
            next_http: AtomicUsize::new(0),
            fail_ws: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn http(&self, index: usize) -> Arc<MockChain> {
        self.http[index].clone()
    }

    /// The next websocket connect attempt fails.
    pub fn fail_ws_once(&self) {
        self.fail_ws.store(true, Ordering::SeqCst);
    }

    pub fn connections(&self) -> Vec<Transport> {
        self.connections.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    async fn connect(
        &self,
        transport: Transport,
    ) -> Result<Arc<dyn ChainProvider>, Error> {
        self.connections.lock().unwrap().push(transport);

        let (chains, next) = match transport {
            Transport::Ws => {
                if self.fail_ws.swap(false, Ordering::SeqCst) {
                    return Err(Error::ProviderError(String::from(
                        "websocket refused",
                    )));
                }
                (&self.ws, &self.next_ws)
            },
            Transport::Http => (&self.http, &self.next_http),
        };

        let index = next.fetch_add(1, Ordering::SeqCst);
        match chains.get(index) {
            Some(chain) => Ok(chain.clone() as Arc<dyn ChainProvider>),
            None => Err(Error::ProviderError(format!(
                "no {} endpoint left",
                transport
            ))),
        }
    }
}

/// In-memory sink with the same reconcile semantics as the database.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
    failing_inserts: AtomicUsize,
}

impl MemorySink {
    pub fn fail_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn provenances(&self) -> Vec<Provenance> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|record| Provenance::from_collected_live(record.collected_live()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn provenance(
        &self,
        record: &Record,
    ) -> Result<Option<Provenance>, Error> {
        let identity = record.identity();

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|stored| stored.identity() == identity)
            .map(|stored| Provenance::from_collected_live(stored.collected_live())))
    }

    async fn insert(&self, record: &Record) -> Result<bool, Error> {
        let failing = self.failing_inserts.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_inserts.store(failing - 1, Ordering::SeqCst);
            return Err(Error::ProviderError(String::from("insert refused")));
        }

        let identity = record.identity();
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|stored| stored.identity() == identity) {
            return Ok(false);
        }
        records.push(record.clone());

        Ok(true)
    }

    async fn confirm(&self, record: &Record) -> Result<bool, Error> {
        let identity = record.identity();
        let mut records = self.records.lock().unwrap();

        match records
            .iter_mut()
            .find(|stored| stored.identity() == identity && stored.collected_live())
        {
            Some(stored) => {
                stored.confirm();
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn latest_cursor(
        &self,
        stream: &HistoryStream,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.stream() == *stream && !record.collected_live())
            .map(Record::timestamp)
            .max())
    }
}
