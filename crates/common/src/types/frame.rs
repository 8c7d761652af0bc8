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

//! Call stack entries

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::VariableRef;

/// Location metadata of a call stack entry as reported by the host runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Class or module-like qualifier
    pub owner_name: String,
    /// Name of the executing function
    pub function_name: String,
    /// Current line (1-based)
    pub line_number: u32,
    /// Source file of the function
    pub source_file: String,
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner_name.is_empty() {
            write!(f, "{}", self.function_name)?;
        } else {
            write!(f, "{}.{}", self.owner_name, self.function_name)?;
        }
        write!(f, " ({}:{})", self.source_file, self.line_number)
    }
}

/// One call stack entry of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Class or module-like qualifier
    pub owner_name: String,
    /// Name of the executing function
    pub function_name: String,
    /// Current line (1-based)
    pub line_number: u32,
    /// Source file of the function
    pub source_file: String,
    /// Root bindings of this frame's local scope, in binding order.
    ///
    /// Descendants are only reachable through the variable table.
    pub variable_ids: Vec<VariableRef>,
}

impl StackFrame {
    /// Metadata-only frame
    pub fn from_info(info: FrameInfo) -> Self {
        Self {
            owner_name: info.owner_name,
            function_name: info.function_name,
            line_number: info.line_number,
            source_file: info.source_file,
            variable_ids: Vec::new(),
        }
    }

    /// Reduce this frame to its call-site coordinates
    pub fn to_call_site(&self) -> Self {
        Self {
            owner_name: String::new(),
            function_name: String::new(),
            line_number: self.line_number,
            source_file: self.source_file.clone(),
            variable_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariableId;

    #[test]
    fn test_call_site_drops_names_and_variables() {
        let mut frame = StackFrame::from_info(FrameInfo {
            owner_name: "Handler".into(),
            function_name: "handle".into(),
            line_number: 12,
            source_file: "handler.py".into(),
        });
        frame.variable_ids.push(VariableRef::to(VariableId(1), "x"));

        let site = frame.to_call_site();
        assert_eq!(site.line_number, 12);
        assert_eq!(site.source_file, "handler.py");
        assert!(site.function_name.is_empty());
        assert!(site.owner_name.is_empty());
        assert!(site.variable_ids.is_empty());
    }

    #[test]
    fn test_frame_info_display() {
        let info = FrameInfo {
            owner_name: String::new(),
            function_name: "main".into(),
            line_number: 3,
            source_file: "app.py".into(),
        };
        assert_eq!(info.to_string(), "main (app.py:3)");
    }
}
