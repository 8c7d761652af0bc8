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

//! Scenario-driven host runtime.
//!
//! [`SimRuntime`] implements [`Runtime`] over a [`Scenario`] loaded from JSON.
//! It backs the `peek` CLI and the engine's tests, and behaves like a real
//! host where it matters: iterators are consumed when read, bindings can raise,
//! and a `poison` object crashes the adapter outright.

mod scenario;
pub use scenario::*;

use std::{borrow::Cow, cell::RefCell, collections::HashMap, fs, path::Path};

use eyre::{bail, eyre, Result};
use peek_common::types::{BreakpointDescriptor, FrameInfo, IdentityKey};
use tracing::debug;

use crate::runtime::{AccessError, Runtime, Slot, ValueView};

/// Frames are addressed by their index in [`Scenario::stack`]
pub type SimFrame = usize;

/// Host runtime over a [`Scenario`]
#[derive(Debug)]
pub struct SimRuntime {
    scenario: Scenario,
    /// Items already consumed, per iterator heap index
    cursors: RefCell<HashMap<usize, usize>>,
}

impl SimRuntime {
    /// Wrap a scenario, rejecting heap references that point nowhere
    pub fn new(scenario: Scenario) -> Result<Self> {
        let heap_len = scenario.heap.len();
        let dangling = scenario
            .heap
            .iter()
            .flat_map(HeapObject::refs)
            .chain(scenario.stack.iter().flat_map(|f| refs_of(&f.locals)))
            .find(|index| *index >= heap_len);
        if let Some(index) = dangling {
            bail!("Scenario references heap object {index}, but the heap has {heap_len} objects");
        }

        debug!(heap = heap_len, frames = scenario.stack.len(), "Loaded scenario");
        Ok(Self { scenario, cursors: RefCell::new(HashMap::new()) })
    }

    /// Parse a scenario from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let scenario = serde_json::from_str(text).map_err(|e| eyre!("Invalid scenario: {e}"))?;
        Self::new(scenario)
    }

    /// Build a scenario from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let scenario = serde_json::from_value(value).map_err(|e| eyre!("Invalid scenario: {e}"))?;
        Self::new(scenario)
    }

    /// Load a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read scenario {}: {e}", path.display()))?;
        Self::from_json(&text)
    }

    /// The underlying scenario
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Innermost frame, if the stack is not empty
    pub fn innermost_frame(&self) -> Option<SimFrame> {
        (!self.scenario.stack.is_empty()).then_some(0)
    }

    /// Descriptors of the scenario's breakpoints.
    ///
    /// Breakpoints without a location default to the innermost frame's line.
    pub fn descriptors(&self) -> Result<Vec<BreakpointDescriptor>> {
        let top = self.scenario.stack.first();
        self.scenario
            .breakpoints
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, mut spec)| {
                if let Some(frame) = top {
                    if spec.source_file.is_empty() {
                        spec.source_file = frame.file.clone();
                    }
                    if spec.line_number == 0 {
                        spec.line_number = frame.line;
                    }
                }
                if spec.id.is_empty() {
                    spec.id = format!("bp-{}", i + 1);
                }
                spec.into_descriptor()
            })
            .collect()
    }

    /// Read ad-hoc bindings against this scenario's heap
    pub fn bindings(&self, value: serde_json::Value) -> Result<Vec<(String, Slot<SimValue>)>> {
        let bindings: Bindings =
            serde_json::from_value(value).map_err(|e| eyre!("Invalid bindings: {e}"))?;
        Ok(bindings.0.into_iter().map(|(name, value)| (name, read(&value))).collect())
    }

    /// Number of items consumed from the iterator at `index`
    pub fn consumed(&self, index: usize) -> usize {
        self.cursors.borrow().get(&index).copied().unwrap_or(0)
    }

    fn heap(&self, value: &SimValue) -> Option<(usize, &HeapObject)> {
        match value {
            SimValue::Ref { index } => self.scenario.heap.get(*index).map(|obj| (*index, obj)),
            _ => None,
        }
    }

    fn member(&self, value: &SimValue, segment: &str) -> Slot<SimValue> {
        let missing = || {
            AccessError::raised(
                "AttributeError",
                format!("{} has no member '{segment}'", self.type_name(value)),
            )
        };
        match self.heap(value).map(|(_, obj)| obj) {
            Some(HeapObject::Dict { entries: bindings, .. })
            | Some(HeapObject::Object { fields: bindings, .. }) => {
                bindings.get(segment).map(read).ok_or_else(missing)?
            }
            Some(
                HeapObject::List { items, .. }
                | HeapObject::Tuple { items, .. }
                | HeapObject::Set { items, .. },
            ) => {
                let index: usize = segment.parse().map_err(|_| missing())?;
                items.get(index).map(read).ok_or_else(|| {
                    AccessError::raised("IndexError", format!("index {index} out of range"))
                })?
            }
            _ => Err(missing()),
        }
    }
}

fn refs_of(bindings: &Bindings) -> Vec<usize> {
    bindings
        .iter()
        .filter_map(|(_, v)| match v {
            SimValue::Ref { index } => Some(*index),
            _ => None,
        })
        .collect()
}

/// Reading a value either yields it or raises
fn read(value: &SimValue) -> Slot<SimValue> {
    match value {
        SimValue::Raise { raise } => Err(raised(raise)),
        other => Ok(other.clone()),
    }
}

/// `"Type: message"`, or a bare message
fn raised(text: &str) -> AccessError {
    match text.split_once(": ") {
        Some((type_name, message)) => AccessError::raised(type_name, message),
        None => AccessError::raised("Error", text),
    }
}

impl Runtime for SimRuntime {
    type Value = SimValue;
    type Frame = SimFrame;

    fn view<'a>(&'a self, value: &'a SimValue) -> ValueView<'a> {
        match value {
            SimValue::Null => ValueView::Null,
            SimValue::Bool(b) => ValueView::Bool(*b),
            SimValue::Int(i) => ValueView::Int(*i),
            SimValue::Float(f) => ValueView::Float(*f),
            SimValue::Str(s) => ValueView::Str(Cow::Borrowed(s)),
            SimValue::Raise { raise } => ValueView::Error { message: Cow::Borrowed(raise) },
            SimValue::Ref { .. } => match self.heap(value).map(|(_, obj)| obj) {
                Some(HeapObject::List { .. } | HeapObject::Tuple { .. } | HeapObject::Set { .. }) => {
                    ValueView::Sequence
                }
                Some(HeapObject::Dict { .. }) => ValueView::Mapping,
                Some(HeapObject::Object { .. }) => ValueView::Object,
                Some(HeapObject::Iterator { .. }) => ValueView::Iterator,
                Some(HeapObject::Error { message, .. }) => {
                    ValueView::Error { message: Cow::Borrowed(message) }
                }
                Some(HeapObject::Opaque { .. }) | None => ValueView::Opaque,
                Some(HeapObject::Poison { message }) => panic!("{message}"),
            },
        }
    }

    fn type_name(&self, value: &SimValue) -> String {
        let name = match value {
            SimValue::Null => "null",
            SimValue::Bool(_) => "bool",
            SimValue::Int(_) => "int",
            SimValue::Float(_) => "float",
            SimValue::Str(_) => "str",
            SimValue::Raise { .. } => "error",
            SimValue::Ref { .. } => match self.heap(value).map(|(_, obj)| obj) {
                Some(HeapObject::List { type_name, .. }) => type_name.as_deref().unwrap_or("list"),
                Some(HeapObject::Tuple { type_name, .. }) => {
                    type_name.as_deref().unwrap_or("tuple")
                }
                Some(HeapObject::Set { type_name, .. }) => type_name.as_deref().unwrap_or("set"),
                Some(HeapObject::Dict { type_name, .. }) => type_name.as_deref().unwrap_or("dict"),
                Some(HeapObject::Iterator { type_name, .. }) => {
                    type_name.as_deref().unwrap_or("iterator")
                }
                Some(HeapObject::Object { class, .. })
                | Some(HeapObject::Error { class, .. })
                | Some(HeapObject::Opaque { class, .. }) => class,
                Some(HeapObject::Poison { .. }) => "poison",
                None => "unknown",
            },
        };
        name.to_string()
    }

    fn identity(&self, value: &SimValue) -> Option<IdentityKey> {
        self.heap(value).map(|(index, _)| IdentityKey(index as u64))
    }

    fn display(&self, value: &SimValue) -> Option<String> {
        match self.heap(value).map(|(_, obj)| obj) {
            Some(HeapObject::Object { repr, .. } | HeapObject::Opaque { repr, .. }) => repr.clone(),
            _ => None,
        }
    }

    fn collection_len(&self, value: &SimValue) -> Option<usize> {
        match self.heap(value)? {
            (_, HeapObject::List { items, .. })
            | (_, HeapObject::Tuple { items, .. })
            | (_, HeapObject::Set { items, .. }) => Some(items.len()),
            (_, HeapObject::Dict { entries, .. }) => Some(entries.len()),
            (index, HeapObject::Iterator { items, .. }) => {
                Some(items.len().saturating_sub(self.consumed(index)))
            }
            _ => None,
        }
    }

    fn elements(&self, value: &SimValue, limit: usize) -> Result<Vec<Slot<SimValue>>, AccessError> {
        match self.heap(value) {
            Some((
                _,
                HeapObject::List { items, .. }
                | HeapObject::Tuple { items, .. }
                | HeapObject::Set { items, .. },
            )) => Ok(items.iter().take(limit).map(read).collect()),
            Some((index, HeapObject::Iterator { items, .. })) => {
                let mut cursors = self.cursors.borrow_mut();
                let cursor = cursors.entry(index).or_insert(0);
                let start = (*cursor).min(items.len());
                let taken: Vec<_> = items[start..].iter().take(limit).map(read).collect();
                *cursor = start + taken.len();
                Ok(taken)
            }
            _ => Err(AccessError::Unsupported(format!(
                "{} has no elements",
                self.type_name(value)
            ))),
        }
    }

    fn members(&self, value: &SimValue) -> Result<Vec<(String, Slot<SimValue>)>, AccessError> {
        match self.heap(value).map(|(_, obj)| obj) {
            Some(HeapObject::Dict { entries, .. }) => {
                Ok(entries.iter().map(|(k, v)| (k.clone(), read(v))).collect())
            }
            Some(HeapObject::Object { raises: Some(raise), .. }) => Err(raised(raise)),
            Some(HeapObject::Object { fields, .. }) => {
                Ok(fields.iter().map(|(k, v)| (k.clone(), read(v))).collect())
            }
            Some(HeapObject::Error { args, .. }) => {
                Ok(args.iter().enumerate().map(|(i, v)| (i.to_string(), read(v))).collect())
            }
            _ => Err(AccessError::Unsupported(format!(
                "{} has no members",
                self.type_name(value)
            ))),
        }
    }

    fn frame_info(&self, frame: &SimFrame) -> FrameInfo {
        let frame = self.scenario.stack.get(*frame).cloned().unwrap_or_default();
        FrameInfo {
            owner_name: frame.owner,
            function_name: frame.function,
            line_number: frame.line,
            source_file: frame.file,
        }
    }

    fn locals(&self, frame: &SimFrame) -> Result<Vec<(String, Slot<SimValue>)>, AccessError> {
        let frame = self
            .scenario
            .stack
            .get(*frame)
            .ok_or_else(|| AccessError::Unsupported(format!("no frame at depth {frame}")))?;
        Ok(frame.locals.iter().map(|(name, value)| (name.clone(), read(value))).collect())
    }

    fn caller(&self, frame: &SimFrame) -> Option<SimFrame> {
        let next = frame + 1;
        (next < self.scenario.stack.len()).then_some(next)
    }

    /// Dotted paths over the bindings: `user.address.0`
    fn evaluate(&self, expression: &str, bindings: &[(String, SimValue)]) -> Slot<SimValue> {
        let mut segments = expression.split('.').map(str::trim);
        let root = segments.next().unwrap_or_default();
        let mut value = bindings
            .iter()
            .find(|(name, _)| name == root)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| {
                AccessError::raised("NameError", format!("name '{root}' is not defined"))
            })?;

        for segment in segments {
            value = self.member(&value, segment)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runtime() -> SimRuntime {
        SimRuntime::from_value(json!({
            "heap": [
                {"kind": "object", "class": "User", "fields": {"name": "ann", "tags": {"ref": 1}}},
                {"kind": "list", "items": ["a", "b"]},
                {"kind": "iterator", "items": [1, 2, 3]},
            ],
            "stack": [
                {"function": "inner", "file": "app.py", "line": 7, "locals": {"user": {"ref": 0}}},
                {"owner": "Server", "function": "outer", "file": "app.py", "line": 30},
            ],
            "breakpoints": [{"capture_kind": "log_point"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_rejects_dangling_heap_refs() {
        let err = SimRuntime::from_value(json!({
            "heap": [{"kind": "list", "items": [{"ref": 3}]}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("heap object 3"));
    }

    #[test]
    fn test_stack_navigation() {
        let rt = runtime();
        let top = rt.innermost_frame().unwrap();
        assert_eq!(rt.frame_info(&top).function_name, "inner");
        let caller = rt.caller(&top).unwrap();
        assert_eq!(rt.frame_info(&caller).owner_name, "Server");
        assert_eq!(rt.caller(&caller), None);
    }

    #[test]
    fn test_descriptors_default_to_innermost_line() {
        let descriptors = runtime().descriptors().unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].id, "bp-1");
        assert_eq!(descriptors[0].source_file, "app.py");
        assert_eq!(descriptors[0].line_number, 7);
    }

    #[test]
    fn test_iterator_is_consumed() {
        let rt = runtime();
        let it = SimValue::Ref { index: 2 };
        assert_eq!(rt.collection_len(&it), Some(3));
        assert_eq!(rt.elements(&it, 2).unwrap().len(), 2);
        assert_eq!(rt.consumed(2), 2);
        assert_eq!(rt.collection_len(&it), Some(1));
        assert_eq!(rt.elements(&it, 5).unwrap(), vec![Ok(SimValue::Int(3))]);
        assert!(rt.elements(&it, 5).unwrap().is_empty());
    }

    #[test]
    fn test_evaluate_dotted_paths() {
        let rt = runtime();
        let bindings = vec![("user".to_string(), SimValue::Ref { index: 0 })];
        assert_eq!(rt.evaluate("user.name", &bindings), Ok(SimValue::Str("ann".into())));
        assert_eq!(rt.evaluate("user.tags.1", &bindings), Ok(SimValue::Str("b".into())));
        assert!(matches!(
            rt.evaluate("nobody", &bindings),
            Err(AccessError::Raised { type_name, .. }) if type_name == "NameError"
        ));
        assert!(matches!(
            rt.evaluate("user.age", &bindings),
            Err(AccessError::Raised { type_name, .. }) if type_name == "AttributeError"
        ));
    }

    #[test]
    #[should_panic(expected = "adapter crashed")]
    fn test_poison_panics() {
        let rt = SimRuntime::from_value(json!({
            "heap": [{"kind": "poison", "message": "adapter crashed"}]
        }))
        .unwrap();
        let _ = rt.view(&SimValue::Ref { index: 0 });
    }
}
