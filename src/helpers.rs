use std::str::FromStr;

use alloy::{
    primitives::{keccak256, Address, FixedBytes, U256},
    transports::{RpcError, TransportErrorKind},
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use crate::error::Error;

/// Provider responses that mean "ask for fewer blocks".
const CAPACITY_MARKERS: [&str; 10] = [
    "payload too large",
    "response size exceeded",
    "response is too big",
    "query returned more than",
    "log response size",
    "too many logs",
    "error 413",
    "status 413",
    "status code 413",
    "413 payload",
];

const PAYLOAD_TOO_LARGE: u16 = 413;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Response size limit hit, the window has to shrink.
    Capacity,
    /// Rate limiting, timeouts and anything else worth a retry.
    Transient,
}

pub fn classify(error: &Error) -> ErrorClass {
    match error {
        Error::PayloadTooLarge { .. } => ErrorClass::Capacity,
        Error::Transport(RpcError::Transport(TransportErrorKind::HttpError(
            http,
        ))) => {
            if http.status == PAYLOAD_TOO_LARGE {
                ErrorClass::Capacity
            } else {
                ErrorClass::Transient
            }
        },
        other => {
            let message = other.to_string().to_lowercase();
            if CAPACITY_MARKERS.iter().any(|marker| message.contains(marker)) {
                ErrorClass::Capacity
            } else {
                ErrorClass::Transient
            }
        },
    }
}

pub fn parse_list(data: &str) -> Vec<String> {
    data.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_owned())
        .collect()
}

pub fn parse_address(value: &str) -> Result<Address, Error> {
    Address::from_str(value.trim()).map_err(|e| {
        Error::ConfigurationError(format!("Invalid address {}: {}", value, e))
    })
}

/// Lowercase `0x` form used for every address column.
pub fn address_string(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn hex_string<const N: usize>(value: &FixedBytes<N>) -> String {
    format!("{:#x}", value)
}

pub fn to_decimal(value: i128) -> BigDecimal {
    BigDecimal::from(value)
}

pub fn u256_to_decimal(value: &U256) -> Result<BigDecimal, Error> {
    Ok(BigDecimal::from_str(&value.to_string())?)
}

pub fn to_datetime(seconds: u64) -> Result<DateTime<Utc>, Error> {
    let seconds = i64::try_from(seconds)?;
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        Error::DecodeDateTimeError(format!("Block timestamp {}", seconds))
    })
}

/// Oracle symbols are right padded with zero bytes, `ETH` + `USD` becomes
/// `ETH-USD`.
pub fn base_quote_label(pair: &[FixedBytes<4>; 2]) -> String {
    let symbol = |bytes: &FixedBytes<4>| {
        String::from_utf8_lossy(bytes.as_slice())
            .trim_end_matches('\0')
            .to_owned()
    };

    format!("{}-{}", symbol(&pair[0]), symbol(&pair[1]))
}

/// Liquidations carry no natural key. The same liquidation always hashes to
/// the same id: trader, perpetual, block and the six lowest digits of the
/// liquidated amount.
pub fn liquidation_id(
    trader: &Address,
    perpetual_id: u32,
    block_number: u64,
    amount: i128,
) -> String {
    let digits = amount.unsigned_abs() % 1_000_000;
    let preimage = format!(
        "{}{}{}{}",
        address_string(trader),
        perpetual_id,
        block_number,
        digits
    );

    hex_string(&keccak256(preimage.as_bytes()))
}
