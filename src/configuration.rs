use std::{
    collections::HashMap,
    env::{self, VarError},
    fs,
    ops::Deref,
    path::Path,
    sync::Arc,
    time::Duration,
};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::{
    error::Error,
    helpers::{parse_address, parse_list},
    provider::DatabasePool,
};

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

#[derive(Debug)]
pub struct State {
    pub config: Config,
    pub database: Arc<DatabasePool>,
}

impl State {
    pub async fn new(
        config: Config,
        database: DatabasePool,
    ) -> Result<State, Error> {
        database.init_migrations().await?;

        Ok(Self {
            config,
            database: Arc::new(database),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawEndpoints {
    #[serde(default)]
    http: Vec<String>,
    #[serde(default)]
    ws: Vec<String>,
}

/// Candidate RPC endpoints of one chain, in rotation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub http: Vec<Url>,
    pub ws: Vec<Url>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub chain_id: u64,
    pub endpoints: HashMap<u64, Endpoints>,
    pub perpetual_manager: Address,
    pub share_tokens: Vec<Address>,
    pub history_floor: DateTime<Utc>,
    /// Seconds.
    pub heartbeat_interval: u64,
    /// Hours.
    pub redundancy_interval: u64,
    /// Seconds.
    pub ws_probe_timeout: u64,
    /// Milliseconds.
    pub poll_interval: u64,
    pub reset_threshold_min: u32,
    pub reset_threshold_max: u32,
    /// Seconds.
    pub timeout: u64,
    pub max_connections: u32,
}

impl Config {
    /// Endpoints of the configured chain.
    pub fn endpoints(&self) -> Result<&Endpoints, Error> {
        self.endpoints.get(&self.chain_id).ok_or_else(|| {
            Error::ConfigurationError(format!(
                "No rpc endpoints for chain {}",
                self.chain_id
            ))
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn redundancy_interval(&self) -> Duration {
        Duration::from_secs(self.redundancy_interval * 60 * 60)
    }

    pub fn ws_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_probe_timeout)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.endpoints()?.http.is_empty() {
            return Err(Error::ConfigurationError(format!(
                "Chain {} needs at least one http endpoint",
                self.chain_id
            )));
        }

        if self.reset_threshold_min == 0
            || self.reset_threshold_min > self.reset_threshold_max
        {
            return Err(Error::ConfigurationError(format!(
                "Invalid reset threshold bounds {}..={}",
                self.reset_threshold_min, self.reset_threshold_max
            )));
        }

        if self.heartbeat_interval == 0 || self.redundancy_interval == 0 {
            return Err(Error::ConfigurationError(String::from(
                "Timer intervals must be positive",
            )));
        }

        Ok(())
    }
}

pub fn get_configuration() -> Result<Config, Error> {
    config_from(|key| env::var(key))
}

fn config_from<F>(var: F) -> Result<Config, Error>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let database_url = var("DATABASE_URL")?;
    let chain_id = var("CHAIN_ID")?.trim().parse()?;
    let endpoints = parse_endpoints(&var("RPC_ENDPOINTS")?)?;
    let perpetual_manager = parse_address(&var("PERPETUAL_MANAGER")?)?;

    let share_tokens = parse_list(&var("SHARE_TOKENS")?)
        .iter()
        .map(|token| parse_address(token))
        .collect::<Result<Vec<Address>, Error>>()?;

    let history_floor = var("HISTORY_FLOOR")?;
    let history_floor = DateTime::parse_from_rfc3339(history_floor.trim())
        .map_err(|e| {
            Error::ConfigurationError(format!(
                "Invalid HISTORY_FLOOR {}: {}",
                history_floor, e
            ))
        })?
        .with_timezone(&Utc);

    let config = Config {
        database_url,
        chain_id,
        endpoints,
        perpetual_manager,
        share_tokens,
        history_floor,
        heartbeat_interval: var("HEARTBEAT_INTERVAL")?.trim().parse()?,
        redundancy_interval: var("REDUNDANCY_INTERVAL")?.trim().parse()?,
        ws_probe_timeout: var("WS_PROBE_TIMEOUT")?.trim().parse()?,
        poll_interval: var("POLL_INTERVAL")?.trim().parse()?,
        reset_threshold_min: var("RESET_THRESHOLD_MIN")?.trim().parse()?,
        reset_threshold_max: var("RESET_THRESHOLD_MAX")?.trim().parse()?,
        timeout: var("TIMEOUT")?.trim().parse()?,
        max_connections: var("MAX_CONNECTIONS")?.trim().parse()?,
    };

    config.validate()?;

    Ok(config)
}

/// `{"<chain id>": {"http": [...], "ws": [...]}}`
pub fn parse_endpoints(data: &str) -> Result<HashMap<u64, Endpoints>, Error> {
    let raw: HashMap<String, RawEndpoints> = serde_json::from_str(data)?;
    let mut endpoints = HashMap::new();

    for (chain_id, item) in raw {
        let chain_id: u64 = chain_id.trim().parse()?;
        let http = item
            .http
            .iter()
            .map(|url| Url::parse(url.trim()))
            .collect::<Result<Vec<Url>, _>>()?;
        let ws = item
            .ws
            .iter()
            .map(|url| Url::parse(url.trim()))
            .collect::<Result<Vec<Url>, _>>()?;

        endpoints.insert(chain_id, Endpoints { http, ws });
    }

    Ok(endpoints)
}

/// Loads `history.conf` defaults, then the optional `.env` overrides, into
/// the process environment.
pub fn set_configuration() -> Result<(), Error> {
    let directory = env!("CARGO_MANIFEST_DIR");
    let defaults = format!("{}/{}", directory, "history.conf");
    let overrides = format!("{}/{}", directory, ".env");

    parse_config_string(fs::read_to_string(defaults)?);

    if Path::new(&overrides).exists() {
        parse_config_string(fs::read_to_string(overrides)?);
    } else {
        info!(".env not found, using history.conf and the environment");
    }

    Ok(())
}

fn parse_config_string(config: String) {
    for (key, value) in parse_params(&config) {
        env::set_var(key, value);
    }
}

/// `KEY=VALUE` lines; blank lines and `#` comments are ignored. Values may
/// contain `=`.
fn parse_params(config: &str) -> Vec<(&str, &str)> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}
