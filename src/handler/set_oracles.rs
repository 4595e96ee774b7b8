use chrono::{DateTime, Utc};

use crate::{
    error::Error,
    helpers::{base_quote_label, hex_string},
    model::{Oracle_Update, Record},
    types::{contract, LogMeta},
};

pub fn parse(
    meta: &LogMeta,
    item: &contract::SetOracles,
    at: DateTime<Utc>,
    collected_live: bool,
) -> Result<Record, Error> {
    let update = Oracle_Update {
        Tx_Hash: hex_string(&meta.tx_hash),
        OU_perpetual_id: item.perpetualId.to::<u32>().into(),
        OU_base_quote_s2: base_quote_label(&item.baseQuoteS2),
        OU_base_quote_s3: base_quote_label(&item.baseQuoteS3),
        OU_block: i64::try_from(meta.block_number)?,
        OU_timestamp: at,
        OU_collected_live: collected_live,
    };

    Ok(Record::OracleUpdate(update))
}
