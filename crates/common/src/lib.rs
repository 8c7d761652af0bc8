// Peek - Live-state Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Peek Common - Shared functionality for peek components
//!
//! This crate holds the snapshot data model, breakpoint descriptors, engine
//! configuration and logging setup shared by the engine and the CLI.

/// Snapshot, frame, variable and breakpoint types
pub mod types;

/// Engine configuration and its loaders
pub mod config;
/// Environment variable names
pub mod env;
/// Expression helpers
pub mod expression;
/// Logging setup and utilities for consistent logging across peek components
pub mod logging;
/// Path-gated assertion macros
pub mod macros;

pub use config::*;
pub use expression::*;
pub use logging::*;
