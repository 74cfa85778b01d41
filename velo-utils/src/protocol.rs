//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// The protocols implemented by the routing suite.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Protocol {
    IGMP,
    MLD,
    OLSR,
}

// ===== impl Protocol =====

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::IGMP => write!(f, "igmp"),
            Protocol::MLD => write!(f, "mld"),
            Protocol::OLSR => write!(f, "olsr"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "igmp" => Ok(Protocol::IGMP),
            "mld" => Ok(Protocol::MLD),
            "olsr" => Ok(Protocol::OLSR),
            _ => Err(()),
        }
    }
}
