//! Authority process configuration.

use std::time::Duration;

use tracing::warn;

/// Environment variable overriding the tick rate.
pub const TICK_RATE_ENV: &str = "COMBAT_TICK_RATE";

/// Environment variable bounding the number of ticks (0 = unlimited).
pub const MAX_TICKS_ENV: &str = "COMBAT_MAX_TICKS";

/// Default target ticks per second.
pub const DEFAULT_TICK_RATE: f64 = 30.0;

/// Configuration for the authority process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Optional NATS URL override (defaults to `NATS_URL` env or localhost).
    pub nats_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_ticks: 0,
            nats_url: None,
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by `COMBAT_TICK_RATE` and `COMBAT_MAX_TICKS`
    /// when they parse.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(rate) = std::env::var(TICK_RATE_ENV)
            .ok()
            .and_then(|raw| raw.parse::<f64>().ok())
        {
            config = config.with_tick_rate(rate);
        }
        if let Some(max_ticks) = std::env::var(MAX_TICKS_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            config = config.with_max_ticks(max_ticks);
        }
        config
    }

    /// Override the NATS URL.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }

    /// Override the tick rate. Rates without a positive, representable tick
    /// period are ignored.
    #[must_use]
    pub fn with_tick_rate(mut self, tick_rate: f64) -> Self {
        if period(tick_rate).is_some() {
            self.tick_rate = tick_rate;
        } else {
            warn!(tick_rate, "invalid tick rate ignored");
        }
        self
    }

    /// Stop after `max_ticks` ticks.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// The NATS URL to connect to.
    #[must_use]
    pub fn nats_url(&self) -> String {
        combat_net::connection::resolve_url(self.nats_url.as_deref())
    }

    /// Wall-clock budget of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        period(self.tick_rate).unwrap_or_else(|| Duration::from_secs_f64(1.0 / DEFAULT_TICK_RATE))
    }
}

fn period(tick_rate: f64) -> Option<Duration> {
    if tick_rate.is_nan() || tick_rate <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / tick_rate)
        .ok()
        .filter(|period| !period.is_zero())
}
