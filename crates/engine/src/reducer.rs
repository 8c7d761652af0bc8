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

//! Capture-kind reductions.
//!
//! A full snapshot is reduced to the fidelity a breakpoint asked for:
//!
//! | Kind         | Frames                 | Variables                     | Watches |
//! |--------------|------------------------|-------------------------------|---------|
//! | `full`       | unchanged              | unchanged                     | kept    |
//! | `log_point`  | innermost keeps roots  | reachable from what is left   | kept    |
//! | `trace_only` | metadata only          | none                          | dropped |
//! | `stack_only` | call-site coordinates  | none                          | dropped |
//! | `profile`    | call-site coordinates  | none                          | dropped |
//!
//! Every reduction is idempotent, and none of them can leave a dangling reference.

use peek_common::types::{
    BreakpointDescriptor, CaptureKind, Snapshot, VariableMap, TAG_BREAKPOINT_ID,
    TAG_CAPTURE_KIND, TAG_LINE_NUMBER, TAG_SOURCE_FILE, TAG_WORKSPACE_ID,
};

/// Reduce a snapshot to the given capture kind
pub fn reduce(mut snapshot: Snapshot, kind: CaptureKind) -> Snapshot {
    match kind {
        CaptureKind::Full => {}
        CaptureKind::LogPoint => {
            for frame in snapshot.frames.iter_mut().skip(1) {
                frame.variable_ids.clear();
            }
            prune_unreachable(&mut snapshot);
        }
        CaptureKind::TraceOnly => strip_variables(&mut snapshot),
        CaptureKind::StackOnly | CaptureKind::Profile => {
            strip_variables(&mut snapshot);
            snapshot.frames = snapshot.frames.iter().map(|f| f.to_call_site()).collect();
        }
    }

    snapshot.tags.insert(TAG_CAPTURE_KIND.to_string(), kind.to_string());
    snapshot
}

/// Reduce a snapshot for a breakpoint and tag it with the breakpoint's metadata
pub fn reduce_for_breakpoint(snapshot: Snapshot, descriptor: &BreakpointDescriptor) -> Snapshot {
    let mut snapshot = reduce(snapshot, descriptor.capture_kind);

    let tags = &mut snapshot.tags;
    tags.insert(TAG_BREAKPOINT_ID.to_string(), descriptor.id.clone());
    tags.insert(TAG_SOURCE_FILE.to_string(), descriptor.source_file.clone());
    tags.insert(TAG_LINE_NUMBER.to_string(), descriptor.line_number.to_string());
    if let Some(workspace_id) = &descriptor.workspace_id {
        tags.insert(TAG_WORKSPACE_ID.to_string(), workspace_id.clone());
    }
    for (key, value) in &descriptor.extra_tags {
        tags.entry(key.clone()).or_insert_with(|| value.clone());
    }

    snapshot
}

fn strip_variables(snapshot: &mut Snapshot) {
    for frame in &mut snapshot.frames {
        frame.variable_ids.clear();
    }
    snapshot.watches.clear();
    snapshot.variable_table.clear();
}

fn prune_unreachable(snapshot: &mut Snapshot) {
    let reachable = snapshot.reachable_ids(snapshot.root_refs());
    let table = std::mem::take(&mut snapshot.variable_table);
    snapshot.variable_table =
        table.into_iter().filter(|(id, _)| reachable.contains(id)).collect::<VariableMap>();
}
