use chrono::{DateTime, Utc};
use tracing::debug;

use super::chain::ChainProvider;
use crate::error::Error;

pub const MAX_CALLS: u32 = 7;
pub const PRECISION_SECS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Block at or before the requested time.
    pub block: u64,
    /// Head observed when the search started, the upper bound of the pass.
    pub head: u64,
    /// Timestamp probes spent on the search.
    pub calls: u32,
}

/// Bounded binary search from wall-clock time to block number. Trades
/// precision for RPC calls: the answer is never after `since` and lands
/// within [`PRECISION_SECS`] of it when the call budget allows.
#[derive(Debug, Clone, Copy)]
pub struct BlockTimestampLocator {
    max_calls: u32,
    precision_secs: u64,
}

impl Default for BlockTimestampLocator {
    fn default() -> Self {
        Self::new(MAX_CALLS, PRECISION_SECS)
    }
}

impl BlockTimestampLocator {
    pub fn new(max_calls: u32, precision_secs: u64) -> Self {
        Self {
            max_calls,
            precision_secs,
        }
    }

    pub async fn locate(
        &self,
        provider: &dyn ChainProvider,
        since: DateTime<Utc>,
    ) -> Result<Located, Error> {
        let head = provider.block_number().await?;
        let head_time = provider.block_timestamp(head).await?;
        let since = u64::try_from(since.timestamp()).unwrap_or_default();

        if since >= head_time {
            return Ok(Located {
                block: head,
                head,
                calls: 0,
            });
        }

        let (mut left, mut left_time) = (0u64, 0u64);
        let (mut right, mut right_time) = (head, head_time);
        let mut calls = 0;

        while calls < self.max_calls
            && right_time.saturating_sub(left_time) > self.precision_secs
            && right - left > 1
        {
            let middle = left + (right - left) / 2;
            let time = provider.block_timestamp(middle).await?;
            calls += 1;

            if time <= since {
                (left, left_time) = (middle, time);
            } else {
                (right, right_time) = (middle, time);
            }
        }

        debug!(block = left, head, calls, "Located start block");

        Ok(Located {
            block: left,
            head,
            calls,
        })
    }
}
