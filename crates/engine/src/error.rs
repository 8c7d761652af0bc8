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

use std::any::Any;

use peek_common::types::VariableId;
use thiserror::Error;

/// Faults that abort a capture.
///
/// Neither of these ever reaches the host program: the capture entry points
/// turn them into a degraded snapshot flagged as failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// A reference points at a variable that is not in the table
    #[error("reference `{name}` points at missing variable {id}")]
    DanglingReference {
        /// Binding name of the reference
        name: String,
        /// Missing id
        id: VariableId,
    },
    /// The host adapter panicked
    #[error("host runtime panicked: {0}")]
    HostPanic(String),
}

impl CaptureError {
    /// Build a [`CaptureError::HostPanic`] from a `catch_unwind` payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::HostPanic(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_payloads() {
        assert_eq!(
            CaptureError::from_panic(Box::new("static")),
            CaptureError::HostPanic("static".into())
        );
        assert_eq!(
            CaptureError::from_panic(Box::new(String::from("owned"))),
            CaptureError::HostPanic("owned".into())
        );
        assert_eq!(
            CaptureError::from_panic(Box::new(7_u8)).to_string(),
            "host runtime panicked: unknown panic payload"
        );
    }

    #[test]
    fn test_dangling_reference_display() {
        let err = CaptureError::DanglingReference { name: "user".into(), id: VariableId(9) };
        assert_eq!(err.to_string(), "reference `user` points at missing variable #9");
    }
}
