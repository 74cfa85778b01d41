//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use crate::version::Version;

// Default values of the per-interface tunables (RFC 3376 Section 8,
// RFC 3810 Section 9).
pub const DFLT_ROBUSTNESS: u8 = 2;
pub const DFLT_QUERY_INTERVAL: u16 = 125;
pub const DFLT_QUERY_RESPONSE_INTERVAL: u16 = 10;
pub const DFLT_LAST_MEMBER_QUERY_INTERVAL: u16 = 1;

// Instance configuration.
#[derive(Debug)]
pub struct InstanceCfg {
    pub enabled: bool,
}

// Interface configuration.
//
// Every tunable has get/set/reset semantics: the validating setters reject
// out-of-range values, and the reset methods restore the compile-time
// default. The interface re-derives its effective (querier-adopted)
// variables whenever one of these changes.
#[derive(Debug)]
pub struct InterfaceCfg<V: Version> {
    pub enabled: bool,
    // Configured protocol version.
    pub version: u8,
    // Whether to require the IP Router Alert option in listener messages.
    pub router_alert_check: bool,
    // Query Interval, in seconds.
    pub query_interval: u16,
    // Query Response Interval, in seconds.
    pub query_response_interval: u16,
    // Last Member Query Interval, in seconds.
    pub last_member_query_interval: u16,
    // Robustness Variable.
    pub robustness: u8,
    _marker: std::marker::PhantomData<V>,
}

// Configuration validation errors.
#[derive(Debug, Eq, PartialEq)]
pub enum ConfigError {
    InvalidVersion(u8),
    InvalidRobustness(u8),
    InvalidInterval(u16),
    ResponseIntervalTooLarge(u16, u16),
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg { enabled: true }
    }
}

// ===== impl InterfaceCfg =====

impl<V> InterfaceCfg<V>
where
    V: Version,
{
    pub fn set_version(&mut self, version: u8) -> Result<(), ConfigError> {
        if !(V::VERSION_MIN..=V::VERSION_MAX).contains(&version) {
            return Err(ConfigError::InvalidVersion(version));
        }
        self.version = version;
        Ok(())
    }

    pub fn reset_version(&mut self) {
        self.version = V::VERSION_DEFAULT;
    }

    pub fn set_router_alert_check(&mut self, enabled: bool) {
        self.router_alert_check = enabled;
    }

    pub fn reset_router_alert_check(&mut self) {
        self.router_alert_check = false;
    }

    pub fn set_query_interval(
        &mut self,
        interval: u16,
    ) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        if self.query_response_interval >= interval {
            return Err(ConfigError::ResponseIntervalTooLarge(
                self.query_response_interval,
                interval,
            ));
        }
        self.query_interval = interval;
        Ok(())
    }

    pub fn reset_query_interval(&mut self) {
        self.query_interval = DFLT_QUERY_INTERVAL;
    }

    pub fn set_query_response_interval(
        &mut self,
        interval: u16,
    ) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        // The Query Response Interval must fit within the Query Interval.
        if interval >= self.query_interval {
            return Err(ConfigError::ResponseIntervalTooLarge(
                interval,
                self.query_interval,
            ));
        }
        self.query_response_interval = interval;
        Ok(())
    }

    pub fn reset_query_response_interval(&mut self) {
        self.query_response_interval = DFLT_QUERY_RESPONSE_INTERVAL;
    }

    pub fn set_last_member_query_interval(
        &mut self,
        interval: u16,
    ) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        self.last_member_query_interval = interval;
        Ok(())
    }

    pub fn reset_last_member_query_interval(&mut self) {
        self.last_member_query_interval = DFLT_LAST_MEMBER_QUERY_INTERVAL;
    }

    pub fn set_robustness(&mut self, robustness: u8) -> Result<(), ConfigError> {
        if robustness == 0 {
            return Err(ConfigError::InvalidRobustness(robustness));
        }
        self.robustness = robustness;
        Ok(())
    }

    pub fn reset_robustness(&mut self) {
        self.robustness = DFLT_ROBUSTNESS;
    }

    // Configured Query Interval as a duration.
    pub(crate) fn query_interval(&self) -> Duration {
        Duration::from_secs(self.query_interval as u64)
    }

    // Configured Query Response Interval as a duration.
    pub(crate) fn query_response_interval(&self) -> Duration {
        Duration::from_secs(self.query_response_interval as u64)
    }

    // Configured Last Member Query Interval as a duration.
    pub(crate) fn last_member_query_interval(&self) -> Duration {
        Duration::from_secs(self.last_member_query_interval as u64)
    }
}

impl<V> Default for InterfaceCfg<V>
where
    V: Version,
{
    fn default() -> InterfaceCfg<V> {
        InterfaceCfg {
            enabled: true,
            version: V::VERSION_DEFAULT,
            router_alert_check: false,
            query_interval: DFLT_QUERY_INTERVAL,
            query_response_interval: DFLT_QUERY_RESPONSE_INTERVAL,
            last_member_query_interval: DFLT_LAST_MEMBER_QUERY_INTERVAL,
            robustness: DFLT_ROBUSTNESS,
            _marker: std::marker::PhantomData,
        }
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidVersion(version) => {
                write!(f, "invalid protocol version: {}", version)
            }
            ConfigError::InvalidRobustness(robustness) => {
                write!(f, "invalid robustness count: {}", robustness)
            }
            ConfigError::InvalidInterval(interval) => {
                write!(f, "invalid interval: {}", interval)
            }
            ConfigError::ResponseIntervalTooLarge(response, query) => {
                write!(
                    f,
                    "query response interval {} must be less than the query \
                     interval {}",
                    response, query
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Igmp, Mld};

    #[test]
    fn version_range() {
        let mut config = InterfaceCfg::<Igmp>::default();
        assert_eq!(config.version, 2);
        assert!(config.set_version(3).is_ok());
        assert_eq!(config.set_version(4), Err(ConfigError::InvalidVersion(4)));
        assert_eq!(config.set_version(0), Err(ConfigError::InvalidVersion(0)));
        config.reset_version();
        assert_eq!(config.version, 2);

        let mut config = InterfaceCfg::<Mld>::default();
        assert_eq!(config.version, 1);
        assert!(config.set_version(2).is_ok());
        assert_eq!(config.set_version(3), Err(ConfigError::InvalidVersion(3)));
    }

    #[test]
    fn robustness_range() {
        let mut config = InterfaceCfg::<Igmp>::default();
        assert_eq!(
            config.set_robustness(0),
            Err(ConfigError::InvalidRobustness(0))
        );
        assert!(config.set_robustness(7).is_ok());
        config.reset_robustness();
        assert_eq!(config.robustness, DFLT_ROBUSTNESS);
    }

    #[test]
    fn response_interval_consistency() {
        let mut config = InterfaceCfg::<Igmp>::default();
        assert_eq!(
            config.set_query_response_interval(125),
            Err(ConfigError::ResponseIntervalTooLarge(125, 125))
        );
        assert!(config.set_query_response_interval(20).is_ok());
        assert_eq!(
            config.set_query_interval(15),
            Err(ConfigError::ResponseIntervalTooLarge(20, 15))
        );
    }
}
