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

//! Variable table and identity cache.
//!
//! The table owns every [`Variable`] of one capture. Composite values are
//! deduplicated through the [`IdentityCache`]: the second time a value is seen,
//! the caller gets the existing id back and emits a back-reference instead of a
//! new subtree. This is also what makes cyclic structures terminate.

use std::collections::HashMap;

use peek_common::{
    peek_assert, peek_assert_eq,
    types::{IdentityKey, TypeTag, Variable, VariableId, VariableMap},
};
use tracing::debug;

/// Runtime identity to variable id, scoped to a single capture
#[derive(Debug, Clone, Default)]
pub struct IdentityCache {
    ids: HashMap<IdentityKey, VariableId>,
}

impl IdentityCache {
    /// Variable already created for this identity
    pub fn get(&self, key: IdentityKey) -> Option<VariableId> {
        self.ids.get(&key).copied()
    }

    /// Remember the variable created for this identity
    pub fn insert(&mut self, key: IdentityKey, id: VariableId) {
        self.ids.insert(key, id);
    }

    /// Number of cached identities
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Outcome of [`VariableTable::get_or_create`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A new variable was created
    Created(VariableId),
    /// The identity was seen before; this is a back-reference
    Existing(VariableId),
    /// The table is full; the binding becomes a placeholder
    Exhausted,
}

impl Lookup {
    /// Id of the variable, if there is one
    pub fn id(&self) -> Option<VariableId> {
        match self {
            Self::Created(id) | Self::Existing(id) => Some(*id),
            Self::Exhausted => None,
        }
    }

    /// Whether a new variable was created
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// All variables of one capture, with a hard ceiling
#[derive(Debug, Clone)]
pub struct VariableTable {
    variables: VariableMap,
    cache: IdentityCache,
    next_id: usize,
    max_variables: usize,
    vars_exceeded: bool,
}

impl VariableTable {
    /// Empty table holding at most `max_variables` variables
    pub fn new(max_variables: usize) -> Self {
        Self {
            variables: VariableMap::new(),
            cache: IdentityCache::default(),
            next_id: 1,
            max_variables,
            vars_exceeded: false,
        }
    }

    /// Look up `identity_key`, or create a new variable for it.
    ///
    /// Values without an identity always get a fresh variable. Once the
    /// ceiling is reached, lookups of known identities still succeed but
    /// nothing new is created, and the table remembers that it overflowed.
    pub fn get_or_create(
        &mut self,
        identity_key: Option<IdentityKey>,
        name: &str,
        type_tag: TypeTag,
        representation: String,
    ) -> Lookup {
        if let Some(id) = identity_key.and_then(|key| self.cache.get(key)) {
            return Lookup::Existing(id);
        }

        if self.is_full() {
            if !self.vars_exceeded {
                debug!(max_variables = self.max_variables, "Variable table is full");
            }
            self.vars_exceeded = true;
            return Lookup::Exhausted;
        }

        let id = VariableId(self.next_id);
        self.next_id += 1;

        self.variables
            .insert(id, Variable::new(id, name, type_tag, representation, identity_key));
        if let Some(key) = identity_key {
            self.cache.insert(key, id);
        }

        peek_assert!(self.variables.len() <= self.max_variables, "table grew past its ceiling");
        peek_assert_eq!(self.next_id, self.variables.len() + 1, "ids must be dense");

        Lookup::Created(id)
    }

    /// Mutable access to a variable
    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.variables.get_mut(&id)
    }

    /// Shared access to a variable
    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    /// Whether the ceiling has been reached
    pub fn is_full(&self) -> bool {
        self.variables.len() >= self.max_variables
    }

    /// Record that the ceiling cut the capture short
    pub fn note_overflow(&mut self) {
        self.vars_exceeded = true;
    }

    /// Whether the ceiling cut the capture short
    pub fn vars_exceeded(&self) -> bool {
        self.vars_exceeded
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Hand the variables over to a snapshot
    pub fn into_variables(self) -> VariableMap {
        self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peek_common::types::Category;

    fn tag() -> TypeTag {
        TypeTag::new(Category::KeyedComposite, "object")
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut table = VariableTable::new(10);
        let a = table.get_or_create(None, "a", tag(), "object".into());
        let b = table.get_or_create(None, "b", tag(), "object".into());
        assert_eq!(a, Lookup::Created(VariableId(1)));
        assert_eq!(b, Lookup::Created(VariableId(2)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_identity_lookup_returns_existing() {
        let mut table = VariableTable::new(10);
        let key = Some(IdentityKey(42));
        let first = table.get_or_create(key, "a", tag(), "object".into());
        let second = table.get_or_create(key, "b", tag(), "object".into());

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.id(), second.id());
        assert_eq!(table.len(), 1);
        // the first name sticks
        assert_eq!(table.get(VariableId(1)).unwrap().name, "a");
    }

    #[test]
    fn test_ceiling_refuses_new_variables() {
        let mut table = VariableTable::new(2);
        table.get_or_create(Some(IdentityKey(1)), "a", tag(), "object".into());
        table.get_or_create(None, "b", tag(), "object".into());
        assert!(table.is_full());
        assert!(!table.vars_exceeded());

        let refused = table.get_or_create(None, "c", tag(), "object".into());
        assert_eq!(refused, Lookup::Exhausted);
        assert_eq!(refused.id(), None);
        assert!(table.vars_exceeded());
        assert_eq!(table.len(), 2);

        // known identities still resolve
        let known = table.get_or_create(Some(IdentityKey(1)), "again", tag(), "object".into());
        assert_eq!(known, Lookup::Existing(VariableId(1)));
    }

    #[test]
    fn test_into_variables() {
        let mut table = VariableTable::new(3);
        table.get_or_create(None, "a", tag(), "object".into());
        let vars = table.into_variables();
        assert_eq!(vars.keys().copied().collect::<Vec<_>>(), vec![VariableId(1)]);
    }
}
