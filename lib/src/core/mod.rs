// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Functionality shared by the publisher and its samples, such as loading and saving of
//! configuration.

pub mod config;

pub mod prelude {
    pub use super::config::*;
}
