use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use ulid::Ulid;

use crate::engine::{parse_date, Season};
use crate::model::{CalendarDate, ProductId};

const DEFAULT_SNAPSHOT: &str = "./availability.json";
const DEFAULT_POLL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Settings of the `vastraveda` binary, read from `VASTRA_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub snapshot: PathBuf,
    /// Product to show. Defaults to the first product in the snapshot.
    pub product: Option<ProductId>,
    /// Overrides the local date, for previewing other seasons.
    pub today: Option<CalendarDate>,
    pub season: Season,
    pub poll_interval: Duration,
    pub watch: bool,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &'static str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let invalid = |var: &'static str, reason: String| ConfigError { var, reason };

        let product = get("VASTRA_PRODUCT")
            .map(|s| Ulid::from_string(&s).map_err(|e| invalid("VASTRA_PRODUCT", e.to_string())))
            .transpose()?;
        let today = get("VASTRA_TODAY")
            .map(|s| parse_date(&s).map_err(|e| invalid("VASTRA_TODAY", e.to_string())))
            .transpose()?;
        let season = get("VASTRA_SEASON")
            .map(|s| s.parse::<Season>().map_err(|e| invalid("VASTRA_SEASON", e.to_string())))
            .transpose()?
            .unwrap_or_default();
        let poll_ms: u64 = get("VASTRA_POLL_MS")
            .map(|s| s.parse().map_err(|_| invalid("VASTRA_POLL_MS", format!("not a number: {s}"))))
            .transpose()?
            .unwrap_or(DEFAULT_POLL_MS);
        if poll_ms == 0 {
            return Err(invalid("VASTRA_POLL_MS", "must be positive".into()));
        }
        let watch = match get("VASTRA_WATCH").as_deref() {
            None | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => return Err(invalid("VASTRA_WATCH", format!("expected true or false, got {other}"))),
        };
        let metrics_port = get("VASTRA_METRICS_PORT")
            .map(|s| s.parse().map_err(|_| invalid("VASTRA_METRICS_PORT", format!("not a port: {s}"))))
            .transpose()?;

        Ok(Self {
            snapshot: PathBuf::from(get("VASTRA_SNAPSHOT").unwrap_or_else(|| DEFAULT_SNAPSHOT.into())),
            product,
            today,
            season,
            poll_interval: Duration::from_millis(poll_ms),
            watch,
            metrics_port,
        })
    }
}
