//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod bytes;
pub mod capabilities;
pub mod ibus;
pub mod ip;
pub mod protocol;
pub mod socket;
pub mod southbound;
pub mod task;

pub use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
