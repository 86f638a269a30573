//! Gossip engine configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{GossipError, Result};

/// Configuration for a [`BlindCounterGossiper`](crate::BlindCounterGossiper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipConfig {
    /// Maximum number of peers contacted per round (B).
    pub fanout: usize,

    /// Relay rounds a message gets before it is considered spread (F).
    pub patience: u32,

    /// How often fully spread messages are swept from history.
    pub cleanup_interval: Duration,

    /// Upper bound on any single peer call.
    pub peer_timeout: Duration,

    /// Originate a push on this period in addition to explicit inserts.
    pub push_interval: Option<Duration>,

    /// Capacity of the "push now" queue.
    pub insert_queue: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            patience: 3,
            cleanup_interval: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(10),
            push_interval: None,
            insert_queue: 10,
        }
    }
}

impl GossipConfig {
    /// Read overrides from `VIVALDI_*` environment variables.
    ///
    /// Unset variables keep their default; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(fanout) = parse_var(&lookup, "VIVALDI_FANOUT")? {
            config.fanout = fanout;
        }
        if let Some(patience) = parse_var(&lookup, "VIVALDI_PATIENCE")? {
            config.patience = patience;
        }
        if let Some(secs) = parse_var(&lookup, "VIVALDI_CLEANUP_SECS")? {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "VIVALDI_PEER_TIMEOUT_SECS")? {
            config.peer_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "VIVALDI_PUSH_INTERVAL_MS")? {
            // 0 disables periodic pushes
            config.push_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    #[must_use]
    pub fn with_patience(mut self, patience: u32) -> Self {
        self.patience = patience;
        self
    }

    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    #[must_use]
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = Some(interval);
        self
    }

    /// Reject values the dissemination loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fanout == 0 {
            return Err(GossipError::Config("fanout must be at least 1".into()));
        }
        if self.patience == 0 {
            return Err(GossipError::Config("patience must be at least 1".into()));
        }
        if self.cleanup_interval.is_zero() || self.peer_timeout.is_zero() {
            return Err(GossipError::Config("intervals must be non-zero".into()));
        }
        if self.push_interval.is_some_and(|p| p.is_zero()) {
            return Err(GossipError::Config("push interval must be non-zero".into()));
        }
        if self.insert_queue == 0 {
            return Err(GossipError::Config("insert queue needs capacity".into()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GossipError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
