//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use serde::Deserialize;
use velo_protocol::event_recorder;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub user: String,
    pub logging: Logging,
    pub event_recorder: event_recorder::Config,
    pub protocols: Protocols,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    pub colors: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Protocols {
    pub igmp: bool,
    pub mld: bool,
    pub olsr: bool,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/velod.toml";

    // Parses the configuration file. A missing default file yields the
    // built-in defaults; a present but invalid file is a startup error.
    pub(crate) fn load(config_file: Option<&str>) -> Result<Config, String> {
        let (path, required) = match config_file {
            Some(path) => (path, true),
            None => (Self::DFLT_FILEPATH, false),
        };

        match std::fs::read_to_string(path) {
            Ok(data) => toml::from_str(&data)
                .map_err(|error| format!("{}: {}", path, error)),
            Err(error) if !required => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    return Err(format!("{}: {}", path, error));
                }
                Ok(Config::default())
            }
            Err(error) => Err(format!("{}: {}", path, error)),
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            user: "velo".to_owned(),
            logging: Default::default(),
            event_recorder: Default::default(),
            protocols: Default::default(),
        }
    }
}

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "velod.log".to_owned(),
        }
    }
}

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            colors: false,
        }
    }
}

impl Default for Protocols {
    fn default() -> Protocols {
        Protocols {
            igmp: true,
            mld: true,
            olsr: true,
        }
    }
}
