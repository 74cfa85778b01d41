//
// Copyright (c) The Velo Project Developers
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod ibus;
pub mod instance;
pub mod interface;
pub mod link;
pub mod neighbor;
pub mod neighborhood;
pub mod network;
pub mod output;
pub mod packet;
pub mod route;
pub mod southbound;
pub mod tasks;
pub mod topology;
pub mod twohop;
