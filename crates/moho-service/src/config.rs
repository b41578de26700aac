//! # Service Configuration
//!
//! TOML-loadable input structs (everything optional, serde defaults) that
//! resolve into concrete runtime configurations carrying the documented
//! defaults. The ZAP security level of the underlying transport is opaque
//! configuration here — the core only passes it through.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use moho_cache::SanitizerOptions;
use moho_wire::{Error, Result};

// ─── ZAP ────────────────────────────────────────────────────────────────────

/// Authentication level of the underlying messaging transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZapLevel {
    /// No authentication.
    #[default]
    Grasslands,
    /// IP-based allow list.
    Strawhouse,
    /// Plain-text user/password.
    Woodhouse,
    /// CURVE encryption.
    Stonehouse,
}

// ─── Input (TOML) ───────────────────────────────────────────────────────────

/// Raw deserialized service configuration; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfigInput {
    /// Depth of the feeder → drainer packet queue.
    pub packet_queue_depth: Option<usize>,
    pub cache: CacheConfigInput,
    pub sanitizer: SanitizerConfigInput,
    pub interpolator: InterpolatorConfigInput,
    pub replier: ReplierConfigInput,
    pub subscriber: SubscriberConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfigInput {
    /// Uniform per-channel ring capacity.
    pub max_packets: Option<usize>,
    /// Glob patterns over the channel component to drop on ingest.
    pub blacklist: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SanitizerConfigInput {
    pub maximum_latency_s: Option<i64>,
    pub maximum_future_time_s: Option<i64>,
    pub bad_data_logging_interval_s: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterpolatorConfigInput {
    pub target_sampling_rate: Option<f64>,
    pub gap_tolerance_us: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReplierConfigInput {
    pub address: Option<String>,
    pub send_high_water_mark: Option<usize>,
    pub receive_high_water_mark: Option<usize>,
    pub polling_timeout_ms: Option<u64>,
    pub zap: Option<ZapLevel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscriberConfigInput {
    pub address: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Receive high-water mark; zero means unbounded.
    pub high_water_mark: Option<usize>,
    pub zap: Option<ZapLevel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestorConfigInput {
    pub address: Option<String>,
    pub send_high_water_mark: Option<usize>,
    pub receive_high_water_mark: Option<usize>,
    pub send_timeout_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
    pub zap: Option<ZapLevel>,
}

// ─── Resolved ───────────────────────────────────────────────────────────────

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub packet_queue_depth: usize,
    pub cache: CacheConfig,
    pub sanitizer: SanitizerOptions,
    pub interpolator: InterpolatorConfig,
    pub replier: ReplierConfig,
    pub subscriber: SubscriberConfig,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_packets: usize,
    pub blacklist: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InterpolatorConfig {
    pub target_sampling_rate: f64,
    pub gap_tolerance_us: i64,
}

#[derive(Debug, Clone)]
pub struct ReplierConfig {
    pub address: String,
    pub send_high_water_mark: usize,
    pub receive_high_water_mark: usize,
    pub polling_timeout: Duration,
    pub zap: ZapLevel,
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub address: String,
    pub timeout: Duration,
    pub high_water_mark: usize,
    pub zap: ZapLevel,
}

#[derive(Debug, Clone)]
pub struct RequestorConfig {
    pub address: String,
    pub send_high_water_mark: usize,
    pub receive_high_water_mark: usize,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
    pub zap: ZapLevel,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfigInput::default().resolve()
    }
}

impl Default for RequestorConfig {
    fn default() -> Self {
        RequestorConfigInput::default().resolve()
    }
}

impl ServiceConfigInput {
    /// Apply the documented defaults.
    pub fn resolve(self) -> ServiceConfig {
        ServiceConfig {
            packet_queue_depth: self.packet_queue_depth.unwrap_or(8192),
            cache: CacheConfig {
                // Roughly five minutes of one-second packets.
                max_packets: self.cache.max_packets.unwrap_or(300),
                blacklist: self.cache.blacklist,
            },
            sanitizer: SanitizerOptions {
                max_latency_s: self.sanitizer.maximum_latency_s.unwrap_or(500),
                max_future_time_s: self.sanitizer.maximum_future_time_s.unwrap_or(0),
                bad_data_logging_interval_s: self
                    .sanitizer
                    .bad_data_logging_interval_s
                    .unwrap_or(3600),
            },
            interpolator: InterpolatorConfig {
                target_sampling_rate: self.interpolator.target_sampling_rate.unwrap_or(100.0),
                gap_tolerance_us: self.interpolator.gap_tolerance_us.unwrap_or(50_000),
            },
            replier: ReplierConfig {
                address: self.replier.address.unwrap_or_default(),
                send_high_water_mark: self.replier.send_high_water_mark.unwrap_or(8192),
                receive_high_water_mark: self.replier.receive_high_water_mark.unwrap_or(4096),
                polling_timeout: Duration::from_millis(
                    self.replier.polling_timeout_ms.unwrap_or(10),
                ),
                zap: self.replier.zap.unwrap_or_default(),
            },
            subscriber: SubscriberConfig {
                address: self.subscriber.address.unwrap_or_default(),
                timeout: Duration::from_millis(self.subscriber.timeout_ms.unwrap_or(10)),
                high_water_mark: self.subscriber.high_water_mark.unwrap_or(0),
                zap: self.subscriber.zap.unwrap_or_default(),
            },
        }
    }
}

impl RequestorConfigInput {
    /// Apply the documented defaults.
    pub fn resolve(self) -> RequestorConfig {
        RequestorConfig {
            address: self.address.unwrap_or_default(),
            send_high_water_mark: self.send_high_water_mark.unwrap_or(4096),
            receive_high_water_mark: self.receive_high_water_mark.unwrap_or(8192),
            send_timeout: Duration::from_millis(self.send_timeout_ms.unwrap_or(0)),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms.unwrap_or(5000)),
            zap: self.zap.unwrap_or_default(),
        }
    }
}

impl ServiceConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let input: ServiceConfigInput = toml::from_str(text)
            .map_err(|e| Error::InvalidArgument(format!("cannot parse configuration: {e}")))?;
        Ok(input.resolve())
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidArgument(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
