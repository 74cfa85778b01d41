//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::packet::{WILL_ALWAYS, WILL_DEFAULT};

// Default protocol intervals, in seconds (RFC 3626, Section 18.2).
pub const DFLT_HELLO_INTERVAL: u16 = 2;
pub const DFLT_REFRESH_INTERVAL: u16 = 2;
pub const DFLT_TC_INTERVAL: u16 = 5;
pub const DFLT_MID_INTERVAL: u16 = 5;
pub const DFLT_DUP_HOLD_TIME: u16 = 30;

// Default MPR coverage.
pub const DFLT_MPR_COVERAGE: u8 = 1;

// Instance configuration.
#[derive(Debug)]
pub struct InstanceCfg {
    pub enabled: bool,
    // TC broadcast interval, in seconds.
    pub tc_interval: u16,
    // MID broadcast interval, in seconds.
    pub mid_interval: u16,
    // Duplicate set hold time, in seconds.
    pub dup_hold_time: u16,
    // Advertised willingness to act as MPR.
    pub willingness: u8,
    // Required number of MPRs covering each two-hop neighbor.
    pub mpr_coverage: u8,
    // Contents of the Advertised Neighbor Set.
    pub tc_redundancy: TcRedundancy,
    // Send an immediate TC when the advertised set shrinks.
    pub loss_triggered_tc: bool,
    // Send an immediate TC when the advertised set changes.
    pub change_triggered_tc: bool,
}

// Interface configuration.
#[derive(Debug)]
pub struct InterfaceCfg {
    pub enabled: bool,
    // HELLO emission interval, in seconds.
    pub hello_interval: u16,
    // Link state refresh interval, in seconds.
    pub refresh_interval: u16,
}

// TC_REDUNDANCY modes (RFC 3626, Section 15.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TcRedundancy {
    // Advertise the MPR selectors only.
    MprsIn = 0,
    // Advertise the MPR selectors and the selected MPRs.
    MprsInOut = 1,
    // Advertise all symmetric neighbors.
    All = 2,
}

// Configuration validation errors.
#[derive(Debug, Eq, PartialEq)]
pub enum ConfigError {
    InvalidInterval(u16),
    InvalidWillingness(u8),
    InvalidMprCoverage(u8),
}

// ===== impl InstanceCfg =====

impl InstanceCfg {
    pub fn set_tc_interval(&mut self, interval: u16) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        self.tc_interval = interval;
        Ok(())
    }

    pub fn reset_tc_interval(&mut self) {
        self.tc_interval = DFLT_TC_INTERVAL;
    }

    pub fn set_mid_interval(
        &mut self,
        interval: u16,
    ) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        self.mid_interval = interval;
        Ok(())
    }

    pub fn reset_mid_interval(&mut self) {
        self.mid_interval = DFLT_MID_INTERVAL;
    }

    pub fn set_willingness(
        &mut self,
        willingness: u8,
    ) -> Result<(), ConfigError> {
        if willingness > WILL_ALWAYS {
            return Err(ConfigError::InvalidWillingness(willingness));
        }
        self.willingness = willingness;
        Ok(())
    }

    pub fn reset_willingness(&mut self) {
        self.willingness = WILL_DEFAULT;
    }

    pub fn set_mpr_coverage(&mut self, coverage: u8) -> Result<(), ConfigError> {
        if coverage == 0 {
            return Err(ConfigError::InvalidMprCoverage(coverage));
        }
        self.mpr_coverage = coverage;
        Ok(())
    }

    pub fn reset_mpr_coverage(&mut self) {
        self.mpr_coverage = DFLT_MPR_COVERAGE;
    }

    pub fn set_tc_redundancy(&mut self, redundancy: TcRedundancy) {
        self.tc_redundancy = redundancy;
    }

    pub fn reset_tc_redundancy(&mut self) {
        self.tc_redundancy = TcRedundancy::MprsIn;
    }

    // TC broadcast interval as a duration.
    pub(crate) fn tc_interval(&self) -> Duration {
        Duration::from_secs(self.tc_interval as u64)
    }

    // MID broadcast interval as a duration.
    pub(crate) fn mid_interval(&self) -> Duration {
        Duration::from_secs(self.mid_interval as u64)
    }

    // How long flooded messages are remembered for duplicate suppression.
    pub(crate) fn dup_hold_time(&self) -> Duration {
        Duration::from_secs(self.dup_hold_time as u64)
    }

    // Validity time advertised in TC messages.
    pub(crate) fn topology_hold_time(&self) -> Duration {
        self.tc_interval() * 3
    }

    // Validity time advertised in MID messages.
    pub(crate) fn mid_hold_time(&self) -> Duration {
        self.mid_interval() * 3
    }
}

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            enabled: true,
            tc_interval: DFLT_TC_INTERVAL,
            mid_interval: DFLT_MID_INTERVAL,
            dup_hold_time: DFLT_DUP_HOLD_TIME,
            willingness: WILL_DEFAULT,
            mpr_coverage: DFLT_MPR_COVERAGE,
            tc_redundancy: TcRedundancy::MprsIn,
            loss_triggered_tc: true,
            change_triggered_tc: true,
        }
    }
}

// ===== impl InterfaceCfg =====

impl InterfaceCfg {
    pub fn set_hello_interval(
        &mut self,
        interval: u16,
    ) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        self.hello_interval = interval;
        Ok(())
    }

    pub fn reset_hello_interval(&mut self) {
        self.hello_interval = DFLT_HELLO_INTERVAL;
    }

    pub fn set_refresh_interval(
        &mut self,
        interval: u16,
    ) -> Result<(), ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        self.refresh_interval = interval;
        Ok(())
    }

    pub fn reset_refresh_interval(&mut self) {
        self.refresh_interval = DFLT_REFRESH_INTERVAL;
    }

    // HELLO emission interval as a duration.
    pub(crate) fn hello_interval(&self) -> Duration {
        Duration::from_secs(self.hello_interval as u64)
    }

    // Validity time advertised in HELLO messages, also bounding how long a
    // neighbor keeps the link after it loses symmetry.
    pub(crate) fn neighbor_hold_time(&self) -> Duration {
        Duration::from_secs(self.refresh_interval as u64) * 3
    }
}

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            enabled: true,
            hello_interval: DFLT_HELLO_INTERVAL,
            refresh_interval: DFLT_REFRESH_INTERVAL,
        }
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidInterval(interval) => {
                write!(f, "invalid interval: {}", interval)
            }
            ConfigError::InvalidWillingness(willingness) => {
                write!(f, "invalid willingness: {}", willingness)
            }
            ConfigError::InvalidMprCoverage(coverage) => {
                write!(f, "invalid MPR coverage: {}", coverage)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn willingness_range() {
        let mut config = InstanceCfg::default();
        assert!(config.set_willingness(7).is_ok());
        assert_eq!(
            config.set_willingness(8),
            Err(ConfigError::InvalidWillingness(8))
        );
        config.reset_willingness();
        assert_eq!(config.willingness, WILL_DEFAULT);
    }

    #[test]
    fn mpr_coverage_range() {
        let mut config = InstanceCfg::default();
        assert_eq!(
            config.set_mpr_coverage(0),
            Err(ConfigError::InvalidMprCoverage(0))
        );
        assert!(config.set_mpr_coverage(2).is_ok());
        config.reset_mpr_coverage();
        assert_eq!(config.mpr_coverage, DFLT_MPR_COVERAGE);
    }
}
