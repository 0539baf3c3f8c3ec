//! Registry configuration: the three core-visible knobs of spec §6,
//! validated at construction time rather than discovered at first use.

use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;

/// Validation failure for a [`RegistryConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryConfigError {
    #[error("heartbeat_interval must be greater than zero")]
    ZeroHeartbeatInterval,
    #[error("subscriber_buffer_high_watermark must be greater than zero")]
    ZeroHighWatermark,
    #[error("replication_send_timeout must be greater than zero")]
    ZeroSendTimeout,
}

/// Core-visible configuration (spec §6):
/// - `heartbeat_interval`: period of the replication channel's heartbeat.
/// - `subscriber_buffer_high_watermark`: per-subscriber backpressure
///   threshold before a subscription is terminated as a slow consumer.
/// - `eviction_quota_initial`: first quota request emitted at startup by
///   the preservation controller.
/// - `replication_send_timeout`: a stalled replication send longer than
///   this converts into a channel close (spec §5).
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    heartbeat_interval: Duration,
    subscriber_buffer_high_watermark: NonZeroUsize,
    eviction_quota_initial: u64,
    replication_send_timeout: Duration,
}

impl RegistryConfig {
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn subscriber_buffer_high_watermark(&self) -> NonZeroUsize {
        self.subscriber_buffer_high_watermark
    }

    pub fn eviction_quota_initial(&self) -> u64 {
        self.eviction_quota_initial
    }

    pub fn replication_send_timeout(&self) -> Duration {
        self.replication_send_timeout
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfigBuilder::default()
            .build()
            .expect("default configuration is always valid")
    }
}

/// Builder that validates before producing a [`RegistryConfig`], mirroring
/// the teacher's configuration-layer discipline of failing fast on an
/// out-of-range value rather than at first use.
#[derive(Debug, Clone)]
pub struct RegistryConfigBuilder {
    heartbeat_interval: Duration,
    subscriber_buffer_high_watermark: usize,
    eviction_quota_initial: u64,
    replication_send_timeout: Duration,
}

impl Default for RegistryConfigBuilder {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            subscriber_buffer_high_watermark: 1024,
            eviction_quota_initial: 0,
            replication_send_timeout: Duration::from_secs(10),
        }
    }
}

impl RegistryConfigBuilder {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_subscriber_buffer_high_watermark(mut self, watermark: usize) -> Self {
        self.subscriber_buffer_high_watermark = watermark;
        self
    }

    pub fn with_eviction_quota_initial(mut self, quota: u64) -> Self {
        self.eviction_quota_initial = quota;
        self
    }

    pub fn with_replication_send_timeout(mut self, timeout: Duration) -> Self {
        self.replication_send_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<RegistryConfig, RegistryConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(RegistryConfigError::ZeroHeartbeatInterval);
        }
        if self.replication_send_timeout.is_zero() {
            return Err(RegistryConfigError::ZeroSendTimeout);
        }
        let subscriber_buffer_high_watermark = NonZeroUsize::new(self.subscriber_buffer_high_watermark)
            .ok_or(RegistryConfigError::ZeroHighWatermark)?;
        Ok(RegistryConfig {
            heartbeat_interval: self.heartbeat_interval,
            subscriber_buffer_high_watermark,
            eviction_quota_initial: self.eviction_quota_initial,
            replication_send_timeout: self.replication_send_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RegistryConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.subscriber_buffer_high_watermark().get(), 1024);
        assert_eq!(config.eviction_quota_initial(), 0);
        assert_eq!(config.replication_send_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_zero_send_timeout() {
        let result = RegistryConfig::builder()
            .with_replication_send_timeout(Duration::ZERO)
            .build();
        assert_eq!(result.unwrap_err(), RegistryConfigError::ZeroSendTimeout);
    }

    #[test]
    fn rejects_zero_heartbeat() {
        let result = RegistryConfig::builder()
            .with_heartbeat_interval(Duration::ZERO)
            .build();
        assert_eq!(result.unwrap_err(), RegistryConfigError::ZeroHeartbeatInterval);
    }

    #[test]
    fn rejects_zero_watermark() {
        let result = RegistryConfig::builder()
            .with_subscriber_buffer_high_watermark(0)
            .build();
        assert_eq!(result.unwrap_err(), RegistryConfigError::ZeroHighWatermark);
    }
}
