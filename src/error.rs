use alloy::{
    sol_types::Error as SOL_DECODE_ERROR,
    transports::TransportError as TRANSPORT_ERROR,
};
use anyhow::Error as ANYHOW_ERROR;
use bigdecimal::ParseBigDecimalError as BIG_DECIMAL_ERROR;
use serde_json::Error as JSON_ERROR;
use sqlx::error::Error as SQL_ERROR;
use std::{
    env::VarError, io::Error as IO_ERROR, num::ParseIntError,
    num::TryFromIntError as TRY_FROM_INT_ERROR,
};
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tracing::subscriber::SetGlobalDefaultError as TRACING_GLOBAL_DEFAULT_ERROR;
use url::ParseError as URL_ERROR;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] IO_ERROR),

    #[error("{0}")]
    URL(#[from] URL_ERROR),

    #[error("{0}")]
    INT(#[from] ParseIntError),

    #[error("{0}")]
    SQL(#[from] SQL_ERROR),

    #[error("{0}")]
    VAR(#[from] VarError),

    #[error("{0}")]
    TokioJoinError(#[from] JoinError),

    #[error("{0}")]
    TokioElapsedError(#[from] Elapsed),

    #[error("{0}")]
    BigDecimalError(#[from] BIG_DECIMAL_ERROR),

    #[error("{0}")]
    JsonError(#[from] JSON_ERROR),

    #[error("{0}")]
    TryFromIntError(#[from] TRY_FROM_INT_ERROR),

    #[error("Rpc error: {0}")]
    Transport(#[from] TRANSPORT_ERROR),

    #[error("Decode log error: {0}")]
    SolDecode(#[from] SOL_DECODE_ERROR),

    #[error("Tracing error: {0}")]
    SetGlobalDefaultError(#[from] TRACING_GLOBAL_DEFAULT_ERROR),

    #[error("{0}")]
    AnyHowError(#[from] ANYHOW_ERROR),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Payload too large for blocks {from}-{to}")]
    PayloadTooLarge { from: u64, to: u64 },

    #[error("Backoff exhausted after {attempts} attempts: {message}")]
    BackoffExhausted { attempts: u32, message: String },

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Log field missing: {0}")]
    FieldNotExist(String),

    #[error("Chain id mismatch, expected {expected}, provider reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Decode datetime: {0}")]
    DecodeDateTimeError(String),

    #[error("Connection reset threshold reached after {0} resets")]
    RestartRequired(u32),

    #[error("Task message error: {0}")]
    TaskError(String),
}
