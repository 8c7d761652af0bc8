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

//! Breadth-first expansion of root bindings into the variable table.
//!
//! The expander works off a FIFO queue, so a level is fully materialized
//! before anything below it. When a budget cuts the capture short, what is
//! left out is always the deepest part of the graph.
//!
//! Per dequeued binding, in order:
//!
//! 1. redaction, before anything is read from the value
//! 2. read failures become error-marked leaves
//! 3. scalars, strings and no-expand values become leaves
//! 4. composites go through the identity cache; a hit is a back-reference
//! 5. new composites at the depth limit are flagged and not expanded
//! 6. otherwise children are enqueued, bounded by the collection limit
//!
//! Once the table is full, every binding still to be visited resolves to a
//! back-reference or a placeholder. Only a binding the table refuses marks the
//! capture as over the variable ceiling.

use std::{collections::VecDeque, fmt};

use peek_common::{
    types::{
        BreakpointDescriptor, Category, NamePredicate, TypeTag, VariableFlag, VariableId,
        VariableRef,
    },
    EngineConfig,
};
use tracing::{debug, trace};

use crate::{
    classify::{classify, describe, truncate, Description, REDACTED},
    runtime::{AccessError, Runtime, Slot, ValueView},
    table::{Lookup, VariableTable},
};

/// Redaction and skip rules applied during expansion.
///
/// Holds the predicates of one or more breakpoints; a name matching any of
/// them is redacted or skipped.
#[derive(Clone, Default)]
pub struct NamePolicy {
    blacklist: Vec<NamePredicate>,
    skiplist: Vec<NamePredicate>,
}

impl fmt::Debug for NamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamePolicy")
            .field("blacklist", &self.blacklist.len())
            .field("skiplist", &self.skiplist.len())
            .finish()
    }
}

impl NamePolicy {
    /// Rules of a single breakpoint
    pub fn from_descriptor(descriptor: &BreakpointDescriptor) -> Self {
        Self::union([descriptor])
    }

    /// Rules of several breakpoints sharing one capture
    pub fn union<'a>(descriptors: impl IntoIterator<Item = &'a BreakpointDescriptor>) -> Self {
        let mut policy = Self::default();
        for descriptor in descriptors {
            policy.blacklist.extend(descriptor.blacklist().cloned());
            policy.skiplist.extend(descriptor.skiplist().cloned());
        }
        policy
    }

    /// Whether the binding name must be redacted
    pub fn is_redacted(&self, name: &str) -> bool {
        self.blacklist.iter().any(|p| p(name))
    }

    /// Whether any segment of a dotted or indexed path must be redacted,
    /// so `holder.token` and `tokens['token']` both count as `token`
    pub fn is_redacted_path(&self, expression: &str) -> bool {
        expression
            .split(['.', '[', ']'])
            .map(|segment| segment.trim().trim_matches(['\'', '"']))
            .filter(|segment| !segment.is_empty())
            .any(|segment| self.is_redacted(segment))
    }

    /// Whether the member key must be left out
    pub fn is_skipped(&self, key: &str) -> bool {
        self.skiplist.iter().any(|p| p(key))
    }
}

/// Where a dequeued binding gets attached
#[derive(Debug, Clone, Copy)]
enum Target {
    Root(usize),
    Child(VariableId),
}

struct Pending<V> {
    name: String,
    value: Slot<V>,
    depth: usize,
    target: Target,
}

/// Children of a composite, and whether some were left out
type Children<V> = (Vec<(String, Slot<V>)>, bool);

/// Breadth-first expander over one host runtime
pub struct Expander<'a, R: Runtime> {
    runtime: &'a R,
    config: &'a EngineConfig,
    policy: &'a NamePolicy,
}

impl<'a, R: Runtime> Expander<'a, R> {
    /// Create an expander
    pub fn new(runtime: &'a R, config: &'a EngineConfig, policy: &'a NamePolicy) -> Self {
        Self { runtime, config, policy }
    }

    /// The host runtime
    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    /// The engine configuration
    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Expand root bindings into `table`.
    ///
    /// Returns one reference per binding, in binding order. Roots are at depth 0.
    pub fn expand(
        &self,
        table: &mut VariableTable,
        bindings: Vec<(String, Slot<R::Value>)>,
    ) -> Vec<VariableRef> {
        let mut roots: Vec<VariableRef> =
            bindings.iter().map(|(name, _)| VariableRef::placeholder(name.clone())).collect();
        let mut queue: VecDeque<Pending<R::Value>> = bindings
            .into_iter()
            .enumerate()
            .map(|(i, (name, value))| Pending { name, value, depth: 0, target: Target::Root(i) })
            .collect();

        while let Some(pending) = queue.pop_front() {
            let target = pending.target;
            let var_ref = self.visit(table, pending, &mut queue);
            match target {
                Target::Root(i) => roots[i] = var_ref,
                Target::Child(parent) => {
                    if let Some(parent) = table.get_mut(parent) {
                        parent.push_child(var_ref);
                    }
                }
            }
        }

        roots
    }

    /// Materialize a redacted binding. Its value is never read.
    pub fn expand_redacted(&self, table: &mut VariableTable, name: String) -> VariableRef {
        let description = Description {
            representation: REDACTED.to_string(),
            size: None,
            flags: vec![VariableFlag::Redacted],
        };
        self.leaf(table, name, TypeTag::new(Category::NoExpand, "redacted"), description)
    }

    /// Materialize a failed read as an error-marked leaf
    pub fn expand_error(
        &self,
        table: &mut VariableTable,
        name: String,
        error: &AccessError,
    ) -> VariableRef {
        let type_name = match error {
            AccessError::Raised { type_name, .. } => type_name.clone(),
            AccessError::Unsupported(_) => "error".to_string(),
        };
        let (representation, truncated) =
            truncate(&error.to_string(), self.config.max_string_length);
        let mut flags = vec![VariableFlag::Error];
        if truncated {
            flags.push(VariableFlag::Truncated);
        }
        self.leaf(
            table,
            name,
            TypeTag::new(Category::NoExpand, type_name),
            Description { representation, size: None, flags },
        )
    }

    fn visit(
        &self,
        table: &mut VariableTable,
        pending: Pending<R::Value>,
        queue: &mut VecDeque<Pending<R::Value>>,
    ) -> VariableRef {
        let Pending { name, value, depth, .. } = pending;

        if self.policy.is_redacted(&name) {
            trace!(name = %name, "Redacting binding");
            return self.expand_redacted(table, name);
        }

        let value = match value {
            Ok(value) => value,
            Err(error) => {
                debug!(name = %name, %error, "Failed to read value");
                return self.expand_error(table, name, &error);
            }
        };

        let tag = classify(self.runtime, &value, self.config);
        let description = describe(self.runtime, &value, &tag, self.config);
        if !tag.category.is_composite() {
            return self.leaf(table, name, tag, description);
        }

        let category = tag.category;
        let identity = self.runtime.identity(&value);
        let id = match table.get_or_create(identity, &name, tag, description.representation) {
            Lookup::Created(id) => id,
            Lookup::Existing(id) => return VariableRef::to(id, name),
            Lookup::Exhausted => return VariableRef::placeholder(name),
        };
        let var_ref = VariableRef::to(id, name);

        let Some(var) = table.get_mut(id) else { return var_ref };
        var.size = description.size;
        var.flags.extend(description.flags);

        if depth >= self.config.max_depth {
            var.add_flag(VariableFlag::Depth);
            return var_ref;
        }

        let children = match category {
            Category::OrderedCollection => self.sequence_children(&value),
            // items read now could not be recorded, and reading consumes them
            Category::ConsumableIterator if table.is_full() => {
                if self.runtime.collection_len(&value) != Some(0) {
                    table.note_overflow();
                }
                return var_ref;
            }
            Category::ConsumableIterator => self.iterator_children(&value),
            _ => self.member_children(&value),
        };

        let Some(var) = table.get_mut(id) else { return var_ref };
        match children {
            Ok((children, truncated)) => {
                if truncated {
                    var.add_flag(VariableFlag::ListTruncated);
                }
                queue.extend(children.into_iter().map(|(name, value)| Pending {
                    name,
                    value,
                    depth: depth + 1,
                    target: Target::Child(id),
                }));
            }
            Err(error) => {
                debug!(name = %var_ref.name, %error, "Failed to enumerate children");
                let (representation, truncated) =
                    truncate(&error.to_string(), self.config.max_string_length);
                var.representation = representation;
                var.add_flag(VariableFlag::Error);
                if truncated {
                    var.add_flag(VariableFlag::Truncated);
                }
            }
        }

        var_ref
    }

    fn leaf(
        &self,
        table: &mut VariableTable,
        name: String,
        tag: TypeTag,
        description: Description,
    ) -> VariableRef {
        let Some(id) = table.get_or_create(None, &name, tag, description.representation).id()
        else {
            return VariableRef::placeholder(name);
        };
        if let Some(var) = table.get_mut(id) {
            var.size = description.size;
            var.flags.extend(description.flags);
        }
        VariableRef::to(id, name)
    }

    /// Sized sequences: one element past the limit is read to detect truncation
    fn sequence_children(&self, value: &R::Value) -> Result<Children<R::Value>, AccessError> {
        let max = self.config.max_collection_size;
        let mut elements = self.runtime.elements(value, max.saturating_add(1))?;
        let truncated = elements.len() > max
            || self.runtime.collection_len(value).is_some_and(|len| len > max);
        elements.truncate(max);
        Ok((indexed(elements), truncated))
    }

    /// Iterators: never read past the limit, since reading consumes
    fn iterator_children(&self, value: &R::Value) -> Result<Children<R::Value>, AccessError> {
        let max = self.config.max_collection_size;
        let elements = self.runtime.elements(value, max)?;
        let truncated = match self.runtime.collection_len(value) {
            Some(remaining) => remaining > 0,
            None => elements.len() >= max,
        };
        Ok((indexed(elements), truncated))
    }

    /// Named members minus skipped keys; mappings are bounded like collections
    fn member_children(&self, value: &R::Value) -> Result<Children<R::Value>, AccessError> {
        let bounded = matches!(self.runtime.view(value), ValueView::Mapping);
        let mut members: Vec<_> = self
            .runtime
            .members(value)?
            .into_iter()
            .filter(|(key, _)| !self.policy.is_skipped(key))
            .collect();

        let max = self.config.max_collection_size;
        let truncated = bounded && members.len() > max;
        if truncated {
            members.truncate(max);
        }
        Ok((members, truncated))
    }
}

fn indexed<V>(elements: Vec<Slot<V>>) -> Vec<(String, Slot<V>)> {
    elements.into_iter().enumerate().map(|(i, slot)| (i.to_string(), slot)).collect()
}
