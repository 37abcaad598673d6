use crate::error::{Error, Result};
use std::time::Duration;

bitflags! {
    pub struct EngineFlags: u32 {
        /// Acknowledge aircraft data sent with ack
        const ACK_DRONE_DATA = 0b00000001;
        /// Write a neutral piloting setpoint once a move duration elapsed
        const NEUTRAL_AFTER_MOVE = 0b00000010;
    }
}

/// Protocol engine settings
///
/// The retry policy of the aircraft is not documented, the defaults are the
/// values known to work with a Mambo and can be tuned per session.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Time to wait for an ack before retransmitting
    pub ack_timeout: Duration,
    /// Retransmissions made before a command fails
    pub max_retries: u32,
    /// Period of the timeout scan
    pub scan_interval: Duration,
    /// Capacity of the queue between the transport and the engine
    pub inbound_capacity: usize,
    /// Capacity of the queue of accepted commands waiting to be written
    pub uplink_capacity: usize,
    /// Period at which a move repeats its setpoint on the piloting channel
    pub piloting_period: Duration,
    pub flags: EngineFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ack_timeout: Duration::from_millis(150),
            max_retries: 3,
            scan_interval: Duration::from_millis(10),
            inbound_capacity: 64,
            uplink_capacity: 1000,
            piloting_period: Duration::from_millis(100),
            flags: EngineFlags::ACK_DRONE_DATA | EngineFlags::NEUTRAL_AFTER_MOVE,
        }
    }
}

impl EngineConfig {
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    pub fn uplink_capacity(mut self, capacity: usize) -> Self {
        self.uplink_capacity = capacity;
        self
    }

    pub fn piloting_period(mut self, period: Duration) -> Self {
        self.piloting_period = period;
        self
    }

    pub fn flags(mut self, flags: EngineFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Parse settings from a query string such as `ack_timeout=150&retries=3&ackdata=0`
    ///
    /// Durations are in milliseconds. Unknown keys are ignored.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut config = EngineConfig::default();

        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "ack_timeout" => config.ack_timeout = Duration::from_millis(value.parse()?),
                "retries" => config.max_retries = value.parse()?,
                "scan_interval" => config.scan_interval = Duration::from_millis(value.parse()?),
                "inbound_queue" => config.inbound_capacity = value.parse()?,
                "uplink_queue" => config.uplink_capacity = value.parse()?,
                "piloting_period" => config.piloting_period = Duration::from_millis(value.parse()?),
                "ackdata" => config.flags.set(EngineFlags::ACK_DRONE_DATA, parse_flag(&key, &value)?),
                "neutral" => config
                    .flags
                    .set(EngineFlags::NEUTRAL_AFTER_MOVE, parse_flag(&key, &value)?),
                _ => continue,
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval.as_millis() == 0 {
            return Err(Error::InvalidConfig("scan_interval must be at least 1 ms".to_owned()));
        }
        if self.piloting_period.as_millis() == 0 {
            return Err(Error::InvalidConfig("piloting_period must be at least 1 ms".to_owned()));
        }
        if self.inbound_capacity == 0 || self.uplink_capacity == 0 {
            return Err(Error::InvalidConfig("queue capacities must not be 0".to_owned()));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(Error::InvalidConfig(format!("{} must be 0 or 1, got {}", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_millis(150));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.piloting_period, Duration::from_millis(100));
        assert!(config.flags.contains(EngineFlags::ACK_DRONE_DATA));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_query() {
        let config =
            EngineConfig::from_query("?ack_timeout=40&retries=5&ackdata=0&piloting_period=50&foo=bar").unwrap();
        assert_eq!(config.ack_timeout, Duration::from_millis(40));
        assert_eq!(config.piloting_period, Duration::from_millis(50));
        assert_eq!(config.max_retries, 5);
        assert!(!config.flags.contains(EngineFlags::ACK_DRONE_DATA));
        assert!(config.flags.contains(EngineFlags::NEUTRAL_AFTER_MOVE));
    }

    #[test]
    fn reject_malformed_values() {
        assert!(matches!(
            EngineConfig::from_query("retries=many"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_query("neutral=yes"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_query("piloting_period=0"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_query("uplink_queue=0"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
