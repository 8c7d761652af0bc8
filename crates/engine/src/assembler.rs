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

//! Snapshot assembly.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use peek_common::types::{Snapshot, SnapshotFlag, StackFrame, VariableMap, WatchResult};

use crate::error::CaptureError;

/// Combine the parts of a capture into a [`Snapshot`].
///
/// Fails if any frame, watch or variable refers to an id that is not in the
/// table. Placeholders carry no id and are always accepted.
pub fn assemble(
    frames: Vec<StackFrame>,
    variable_table: VariableMap,
    watches: Vec<WatchResult>,
    flags: BTreeSet<SnapshotFlag>,
    tags: BTreeMap<String, String>,
) -> Result<Snapshot, CaptureError> {
    let snapshot = Snapshot {
        frames,
        variable_table,
        watches,
        flags,
        tags,
        log_message: None,
        captured_at: Utc::now(),
    };

    let dangling =
        snapshot.dangling_refs().into_iter().find_map(|r| r.id.map(|id| (r.name.clone(), id)));
    if let Some((name, id)) = dangling {
        return Err(CaptureError::DanglingReference { name, id });
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peek_common::types::{Category, FrameInfo, TypeTag, Variable, VariableId, VariableRef};

    fn frame(refs: Vec<VariableRef>) -> StackFrame {
        let mut frame = StackFrame::from_info(FrameInfo {
            owner_name: String::new(),
            function_name: "main".into(),
            line_number: 1,
            source_file: "main.py".into(),
        });
        frame.variable_ids = refs;
        frame
    }

    fn table(ids: &[usize]) -> VariableMap {
        ids.iter()
            .map(|id| {
                let var = Variable::new(
                    VariableId(*id),
                    format!("v{id}"),
                    TypeTag::new(Category::Scalar, "int"),
                    id.to_string(),
                    None,
                );
                (VariableId(*id), var)
            })
            .collect()
    }

    #[test]
    fn test_assemble_consistent_parts() {
        let frames = vec![frame(vec![VariableRef::to(VariableId(1), "x")])];
        let watches = vec![WatchResult {
            name: "x".into(),
            expression: "x".into(),
            root: VariableRef::to(VariableId(2), "x"),
        }];
        let snapshot = assemble(
            frames,
            table(&[1, 2]),
            watches,
            BTreeSet::from([SnapshotFlag::VarsExceeded]),
            BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(snapshot.frames.len(), 1);
        assert_eq!(snapshot.variable_table.len(), 2);
        assert!(snapshot.has_flag(SnapshotFlag::VarsExceeded));
        assert_eq!(snapshot.log_message, None);
    }

    #[test]
    fn test_assemble_accepts_placeholders() {
        let frames = vec![frame(vec![VariableRef::placeholder("z")])];
        assert!(assemble(frames, VariableMap::new(), vec![], BTreeSet::new(), BTreeMap::new())
            .is_ok());
    }

    #[test]
    fn test_assemble_rejects_dangling_reference() {
        let frames = vec![frame(vec![VariableRef::to(VariableId(7), "ghost")])];
        let err = assemble(frames, table(&[1]), vec![], BTreeSet::new(), BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, CaptureError::DanglingReference { name: "ghost".into(), id: VariableId(7) });
    }
}
