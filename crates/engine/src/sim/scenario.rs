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

//! Serializable description of a paused program.
//!
//! ```json
//! {
//!   "heap": [
//!     { "kind": "object", "class": "User", "fields": { "name": "ann", "friend": { "ref": 0 } } }
//!   ],
//!   "stack": [
//!     { "function": "handle", "file": "app.py", "line": 12, "locals": { "user": { "ref": 0 } } }
//!   ],
//!   "breakpoints": [ { "id": "bp-1", "source_file": "app.py", "line_number": 12 } ]
//! }
//! ```
//!
//! Composite values live on the heap and are referenced by index, so sharing
//! and cycles are expressed the same way a real runtime would have them.

use std::fmt;

use peek_common::types::BreakpointSpec;
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// A value in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimValue {
    /// Reference to a heap object, written `{"ref": n}`
    Ref {
        /// Heap index
        #[serde(rename = "ref")]
        index: usize,
    },
    /// A binding that raises when read, written `{"raise": "Type: message"}`
    Raise {
        /// Error text; a `Type: ` prefix names the error type
        raise: String,
    },
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(String),
}

/// Named values that keep their document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(pub Vec<(String, SimValue)>);

impl Bindings {
    /// Iterate over the bindings in order
    pub fn iter(&self) -> impl Iterator<Item = &(String, SimValue)> {
        self.0.iter()
    }

    /// Look up a binding by name
    pub fn get(&self, name: &str) -> Option<&SimValue> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Bindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Bindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BindingsVisitor;

        impl<'de> Visitor<'de> for BindingsVisitor {
            type Value = Bindings;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Bindings, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, SimValue>()? {
                    entries.push((key, value));
                }
                Ok(Bindings(entries))
            }
        }

        deserializer.deserialize_map(BindingsVisitor)
    }
}

/// A composite value on the scenario heap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeapObject {
    /// Ordered, sized collection
    List {
        /// Elements
        items: Vec<SimValue>,
        /// Runtime type name, defaults to `list`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// Ordered, sized, immutable collection
    Tuple {
        /// Elements
        items: Vec<SimValue>,
        /// Runtime type name, defaults to `tuple`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// Sized collection; the scenario fixes its iteration order
    Set {
        /// Elements
        items: Vec<SimValue>,
        /// Runtime type name, defaults to `set`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// Mapping with string keys
    Dict {
        /// Entries
        entries: Bindings,
        /// Runtime type name, defaults to `dict`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// Object with named fields
    Object {
        /// Class name
        class: String,
        /// Fields
        #[serde(default)]
        fields: Bindings,
        /// Host rendering of the object
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repr: Option<String>,
        /// Error text raised when the fields are enumerated
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raises: Option<String>,
    },
    /// Iterator; items are consumed as they are read
    Iterator {
        /// Items still to be produced
        items: Vec<SimValue>,
        /// Runtime type name, defaults to `iterator`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// Raised error value
    Error {
        /// Error class
        class: String,
        /// Message
        message: String,
        /// Constructor arguments
        #[serde(default)]
        args: Vec<SimValue>,
    },
    /// Value the engine must not look into
    Opaque {
        /// Class name
        class: String,
        /// Host rendering
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repr: Option<String>,
    },
    /// Value whose inspection crashes the host adapter
    Poison {
        /// Panic message
        message: String,
    },
}

impl HeapObject {
    /// Heap indices this object refers to
    pub fn refs(&self) -> Vec<usize> {
        let values: Vec<&SimValue> = match self {
            Self::List { items, .. }
            | Self::Tuple { items, .. }
            | Self::Set { items, .. }
            | Self::Iterator { items, .. } => items.iter().collect(),
            Self::Dict { entries, .. } => entries.iter().map(|(_, v)| v).collect(),
            Self::Object { fields, .. } => fields.iter().map(|(_, v)| v).collect(),
            Self::Error { args, .. } => args.iter().collect(),
            Self::Opaque { .. } | Self::Poison { .. } => Vec::new(),
        };
        values
            .into_iter()
            .filter_map(|v| match v {
                SimValue::Ref { index } => Some(*index),
                _ => None,
            })
            .collect()
    }
}

/// One paused frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioFrame {
    /// Owning class or module, may be empty
    pub owner: String,
    /// Function name
    pub function: String,
    /// Source file
    pub file: String,
    /// Line the frame is paused on
    pub line: u32,
    /// Local bindings, in binding order
    pub locals: Bindings,
}

/// A paused program and the breakpoints that fired in it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Composite values
    pub heap: Vec<HeapObject>,
    /// Frames, innermost first
    pub stack: Vec<ScenarioFrame>,
    /// Breakpoints that fired on the innermost frame's line
    pub breakpoints: Vec<BreakpointSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_keep_document_order() {
        let bindings: Bindings = serde_json::from_str(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let names: Vec<_> = bindings.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(bindings.get("a"), Some(&SimValue::Int(2)));
    }

    #[test]
    fn test_sim_value_forms() {
        let values: Vec<SimValue> =
            serde_json::from_str(r#"[null, true, 3, 2.5, "s", {"ref": 4}, {"raise": "E: x"}]"#)
                .unwrap();
        assert_eq!(
            values,
            vec![
                SimValue::Null,
                SimValue::Bool(true),
                SimValue::Int(3),
                SimValue::Float(2.5),
                SimValue::Str("s".into()),
                SimValue::Ref { index: 4 },
                SimValue::Raise { raise: "E: x".into() },
            ]
        );
    }

    #[test]
    fn test_heap_object_kinds() {
        let object: HeapObject = serde_json::from_str(
            r#"{"kind": "object", "class": "User", "fields": {"b": {"ref": 1}, "a": {"ref": 2}}}"#,
        )
        .unwrap();
        assert_eq!(object.refs(), vec![1, 2]);

        let poison: HeapObject =
            serde_json::from_str(r#"{"kind": "poison", "message": "boom"}"#).unwrap();
        assert!(poison.refs().is_empty());

        assert!(serde_json::from_str::<HeapObject>(r#"{"kind": "unknown"}"#).is_err());
    }

    #[test]
    fn test_scenario_defaults() {
        let scenario: Scenario =
            serde_json::from_str(r#"{"stack": [{"function": "main", "line": 3}]}"#).unwrap();
        assert!(scenario.heap.is_empty());
        assert_eq!(scenario.stack[0].function, "main");
        assert!(scenario.stack[0].locals.is_empty());
    }
}
