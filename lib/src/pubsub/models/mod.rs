// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The configuration and diagnostics records of the publisher, serialized in PascalCase.

mod data_set;
mod diagnostics;
mod enums;
mod flags;
mod timespan;
mod writer_group;

pub use data_set::*;
pub use diagnostics::*;
pub use enums::*;
pub use flags::*;
pub use timespan::*;
pub use writer_group::*;
