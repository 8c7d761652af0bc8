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

//! The capture artifact produced for one breakpoint hit.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StackFrame, Variable, VariableId, VariableRef};

/// Flat variable table shared by all frames and watches of a snapshot
pub type VariableMap = BTreeMap<VariableId, Variable>;

/// Tag holding the capture kind
pub const TAG_CAPTURE_KIND: &str = "capture_kind";
/// Tag holding the triggering source file
pub const TAG_SOURCE_FILE: &str = "source_file";
/// Tag holding the triggering line number
pub const TAG_LINE_NUMBER: &str = "line_number";
/// Tag holding the breakpoint id
pub const TAG_BREAKPOINT_ID: &str = "breakpoint_id";
/// Tag holding the workspace id
pub const TAG_WORKSPACE_ID: &str = "workspace_id";
/// Tag holding the reason a capture failed
pub const TAG_CAPTURE_ERROR: &str = "capture_error";

/// Capture-level flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFlag {
    /// The processing time budget ran out; later frames were not expanded
    TimeExceeded,
    /// The variable ceiling was hit; some references are placeholders
    VarsExceeded,
    /// The capture aborted; only the metadata gathered so far is included
    CaptureFailed,
}

/// Result of one watch expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchResult {
    /// Display name of the watch
    pub name: String,
    /// Expression text that was evaluated
    pub expression: String,
    /// Root variable holding the result
    pub root: VariableRef,
}

/// Snapshot of the live state at a triggered breakpoint.
///
/// Created fresh per hit and never mutated after it is handed to the
/// transport; reductions produce new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Call stack, innermost frame first
    pub frames: Vec<StackFrame>,
    /// All materialized variables keyed by id
    pub variable_table: VariableMap,
    /// Watch results, in evaluation order
    pub watches: Vec<WatchResult>,
    /// Capture-level flags
    pub flags: BTreeSet<SnapshotFlag>,
    /// Free-form routing metadata
    pub tags: BTreeMap<String, String>,
    /// Rendered log-point message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
    /// When the breakpoint was hit
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Look up a variable by id
    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variable_table.get(&id)
    }

    /// Resolve a reference, returning `None` for placeholders and dangling ids
    pub fn resolve(&self, var_ref: &VariableRef) -> Option<&Variable> {
        var_ref.id.and_then(|id| self.variable(id))
    }

    /// Check if the given flag is set
    pub fn has_flag(&self, flag: SnapshotFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Innermost frame, if any
    pub fn innermost_frame(&self) -> Option<&StackFrame> {
        self.frames.first()
    }

    /// Look up a tag
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// References held directly by frames and watches
    pub fn root_refs(&self) -> impl Iterator<Item = &VariableRef> {
        self.frames
            .iter()
            .flat_map(|frame| frame.variable_ids.iter())
            .chain(self.watches.iter().map(|watch| &watch.root))
    }

    /// Every reference in the snapshot whose id is missing from the table
    pub fn dangling_refs(&self) -> Vec<&VariableRef> {
        let nested = self.variable_table.values().flat_map(|var| var.children_ids.iter());
        self.root_refs()
            .chain(nested)
            .filter(|r| matches!(r.id, Some(id) if !self.variable_table.contains_key(&id)))
            .collect()
    }

    /// Ids reachable from the given roots by following children
    pub fn reachable_ids<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a VariableRef>,
    ) -> BTreeSet<VariableId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<VariableId> = roots.into_iter().filter_map(|r| r.id).collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(var) = self.variable(id) {
                queue.extend(var.children_ids.iter().filter_map(|c| c.id));
            }
        }

        seen
    }
}
