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

//! Materialized variable nodes of a snapshot.
//!
//! A [`Variable`] is one node of the expanded object graph. Nodes are stored
//! flat in the snapshot's variable table and refer to each other through
//! [`VariableRef`]s, so shared structure and cycles are just repeated ids.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// Identifier of a [`Variable`], unique and monotonically assigned within one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableId(pub usize);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key derived from the runtime identity of a value.
///
/// Only used to detect "same object seen again"; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(pub u64);

/// Classification of a runtime value.
///
/// This is a closed set: new host types are mapped onto one of these
/// categories, each of which has exactly one expansion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Numbers, booleans and null
    Scalar,
    /// Text values
    StringLike,
    /// Values that are rendered but never expanded
    NoExpand,
    /// Sized, indexable collections (lists, tuples, sets)
    OrderedCollection,
    /// Iterators whose items are consumed when read
    ConsumableIterator,
    /// Mappings and objects with named fields
    KeyedComposite,
    /// Raised errors, expanded over their constructor arguments
    ErrorLike,
}

impl Category {
    /// Whether values of this category may produce child variables
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::OrderedCollection
                | Self::ConsumableIterator
                | Self::KeyedComposite
                | Self::ErrorLike
        )
    }
}

/// Type information of a variable: its category plus the runtime type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTag {
    /// Output of the value classifier
    pub category: Category,
    /// Human readable runtime type name
    pub type_name: String,
}

impl TypeTag {
    /// Create a new type tag
    pub fn new(category: Category, type_name: impl Into<String>) -> Self {
        Self { category, type_name: type_name.into() }
    }
}

/// Per-variable flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableFlag {
    /// The string representation was cut at the configured maximum length
    Truncated,
    /// The variable is a collection whose elements are child variables
    Collection,
    /// The binding name is blacklisted; the value was never read
    Redacted,
    /// Expansion stopped because the maximum depth was reached
    Depth,
    /// Only the first elements of the collection were captured
    ListTruncated,
    /// Reading the value (or one of its fields) raised an error
    Error,
}

/// A reference to a variable from a frame, a watch or a parent variable.
///
/// The name is the binding name, index or key at the referencing site, so two
/// references to the same variable may carry different names. A reference
/// without an id is a placeholder emitted once the variable ceiling was hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRef {
    /// Name of the binding at this site
    pub name: String,
    /// Referenced variable, `None` for a placeholder
    pub id: Option<VariableId>,
}

impl VariableRef {
    /// Reference to an existing variable
    pub fn to(id: VariableId, name: impl Into<String>) -> Self {
        Self { name: name.into(), id: Some(id) }
    }

    /// Placeholder reference for a binding that could not be materialized
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self { name: name.into(), id: None }
    }

    /// Whether this reference lacks a backing variable
    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }
}

/// One materialized node in the expanded graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique id within the snapshot
    pub id: VariableId,
    /// Binding name, index or key that first produced this node
    pub name: String,
    /// Classifier output and runtime type name
    pub type_tag: TypeTag,
    /// Truncation-safe rendering, or a size marker for composites
    pub representation: String,
    /// Element count of sized collections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Runtime identity, used only for cache lookups
    #[serde(skip)]
    pub identity_key: Option<IdentityKey>,
    /// Children added by expansion
    pub children_ids: Vec<VariableRef>,
    /// Flags
    pub flags: BTreeSet<VariableFlag>,
}

impl Variable {
    /// Create a new variable without children
    pub fn new(
        id: VariableId,
        name: impl Into<String>,
        type_tag: TypeTag,
        representation: impl Into<String>,
        identity_key: Option<IdentityKey>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            type_tag,
            representation: representation.into(),
            size: None,
            identity_key,
            children_ids: Vec::new(),
            flags: BTreeSet::new(),
        }
    }

    /// Check if the given flag is set
    pub fn has_flag(&self, flag: VariableFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Set a flag
    pub fn add_flag(&mut self, flag: VariableFlag) {
        self.flags.insert(flag);
    }

    /// Append a child reference
    pub fn push_child(&mut self, child: VariableRef) {
        self.children_ids.push(child);
    }

    /// Category of this variable
    pub fn category(&self) -> Category {
        self.type_tag.category
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_reference() {
        let r = VariableRef::placeholder("z");
        assert!(r.is_placeholder());
        assert_eq!(r.name, "z");

        let r = VariableRef::to(VariableId(3), "a");
        assert!(!r.is_placeholder());
        assert_eq!(r.id, Some(VariableId(3)));
    }

    #[test]
    fn test_identity_key_is_not_serialized() {
        let var = Variable::new(
            VariableId(1),
            "a",
            TypeTag::new(Category::OrderedCollection, "list"),
            "Size: 2",
            Some(IdentityKey(42)),
        );
        let json = serde_json::to_value(&var).unwrap();
        assert!(json.get("identity_key").is_none());
        assert_eq!(json["type_tag"]["category"], "ordered_collection");
    }

    #[test]
    fn test_composite_categories() {
        assert!(Category::KeyedComposite.is_composite());
        assert!(Category::ErrorLike.is_composite());
        assert!(!Category::NoExpand.is_composite());
        assert!(!Category::StringLike.is_composite());
    }
}
