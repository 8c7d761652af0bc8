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

//! Environment variable name constants for peek configuration.
//!
//! # Environment Variables
//!
//! - [`PEEK_ASSERT`] - Controls selective runtime assertion macros
//! - [`PEEK_CONFIG`] - Path of the engine configuration file
//! - [`PEEK_LOG_DIR`] - Directory for file logging

/// Environment variable for controlling selective runtime assertions.
///
/// Works like `RUST_LOG`, but for the assertion macros in [`crate::macros`].
///
/// # Syntax
///
/// - `PEEK_ASSERT=*` or `PEEK_ASSERT=all` - Enable all assertions
/// - `PEEK_ASSERT=peek_engine` - Enable assertions in the `peek_engine` crate and submodules
/// - `PEEK_ASSERT=peek_engine::table,peek_common::types` - Multiple targets (comma-separated)
///
/// # Default
///
/// When not set or empty, all assertions are **disabled**.
pub const PEEK_ASSERT: &str = "PEEK_ASSERT";

/// Environment variable pointing at the TOML engine configuration file.
///
/// # Default
///
/// When not set, [`crate::EngineConfig::default`] is used.
///
/// # Examples
///
/// ```bash
/// PEEK_CONFIG=/etc/peek/engine.toml peek capture scenario.json
/// ```
///
/// The `--config` CLI argument takes precedence over this variable.
pub const PEEK_CONFIG: &str = "PEEK_CONFIG";

/// Environment variable overriding the directory used for file logging.
///
/// # Default
///
/// `<temp dir>/peek-logs/<component>`
pub const PEEK_LOG_DIR: &str = "PEEK_LOG_DIR";
