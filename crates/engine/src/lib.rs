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


//! Peek Engine - bounded live-state snapshots
//!
//! The engine turns a paused call stack into a [`Snapshot`](peek_common::types::Snapshot):
//! a flat, id-keyed variable table plus frames and watches that refer into it.
//! Host runtimes plug in through the [`Runtime`] trait; [`sim::SimRuntime`] is
//! a scripted runtime driven by JSON scenarios.
//!
//! Every capture is bounded by depth, collection size, string length,
//! variable count and wall time, and is isolated from host faults.

pub mod assembler;
pub use assembler::*;

pub mod capture;
pub use capture::*;

pub mod classify;
pub use classify::*;

pub mod error;
pub use error::*;

pub mod metrics;
pub use metrics::*;

pub mod reducer;
pub use reducer::*;

pub mod runtime;
pub use runtime::*;

pub mod sim;

pub mod table;
pub use table::*;

pub mod traversal;
pub use traversal::*;

pub mod walker;
pub use walker::*;

pub mod watch;
pub use watch::*;
