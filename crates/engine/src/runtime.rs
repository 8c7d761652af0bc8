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

//! Host runtime abstraction.
//!
//! The engine never inspects host values directly. Everything it learns about
//! the paused program goes through a [`Runtime`]: the shape of a value, its
//! identity, its children, and the frames of the paused stack.
//!
//! Reads may fail. A host value can raise while it is being enumerated or one
//! of its members can refuse to be read, so child access returns [`Slot`]s and
//! the engine turns failures into error-marked variables instead of aborting.

use std::borrow::Cow;

use peek_common::types::{FrameInfo, IdentityKey};
use thiserror::Error;

/// Result of reading one binding, element or member
pub type Slot<V> = Result<V, AccessError>;

/// Failure while reading a host value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The host raised while the value was read
    #[error("{type_name}: {message}")]
    Raised {
        /// Type of the raised error
        type_name: String,
        /// Error message
        message: String,
    },
    /// The host does not support this access on the value
    #[error("unsupported access: {0}")]
    Unsupported(String),
}

impl AccessError {
    /// Shorthand for a raised error
    pub fn raised(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised { type_name: type_name.into(), message: message.into() }
    }
}

/// Shape of a host value, as far as the classifier is concerned
#[derive(Debug, Clone, PartialEq)]
pub enum ValueView<'a> {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer that fits in 64 bits
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Number the host renders itself (big integers, decimals, ...)
    Number(Cow<'a, str>),
    /// Text
    Str(Cow<'a, str>),
    /// Sized, indexable collection
    Sequence,
    /// Iterator whose items are consumed when read
    Iterator,
    /// Mapping from keys to values
    Mapping,
    /// Object with named fields
    Object,
    /// Raised error value
    Error {
        /// Error message
        message: Cow<'a, str>,
    },
    /// Anything the engine must not look into
    Opaque,
}

/// Adapter over the paused host program.
///
/// Values and frames are cheap handles; the engine clones them freely while
/// it walks the stack. None of these methods may mutate observable program
/// state, with the single exception of [`Runtime::elements`] on iterators,
/// which consumes at most the requested number of items.
pub trait Runtime {
    /// Handle to a host value
    type Value: Clone;
    /// Handle to a paused stack frame
    type Frame: Clone;

    /// Shape of the value
    fn view<'a>(&'a self, value: &'a Self::Value) -> ValueView<'a>;

    /// Runtime type name of the value
    fn type_name(&self, value: &Self::Value) -> String;

    /// Identity of the value, `None` for values without one (scalars)
    fn identity(&self, value: &Self::Value) -> Option<IdentityKey>;

    /// Host rendering of values the engine does not look into
    fn display(&self, _value: &Self::Value) -> Option<String> {
        None
    }

    /// Element count, if the host knows it without enumerating
    fn collection_len(&self, _value: &Self::Value) -> Option<usize> {
        None
    }

    /// Up to `limit` elements of a sequence or iterator, in order
    fn elements(
        &self,
        value: &Self::Value,
        limit: usize,
    ) -> Result<Vec<Slot<Self::Value>>, AccessError>;

    /// Named members of a mapping or object, or the constructor arguments of an error
    fn members(&self, value: &Self::Value) -> Result<Vec<(String, Slot<Self::Value>)>, AccessError>;

    /// Source coordinates and names of the frame
    fn frame_info(&self, frame: &Self::Frame) -> FrameInfo;

    /// Local bindings of the frame, in binding order
    fn locals(&self, frame: &Self::Frame) -> Result<Vec<(String, Slot<Self::Value>)>, AccessError>;

    /// The frame that called this one
    fn caller(&self, frame: &Self::Frame) -> Option<Self::Frame>;

    /// Evaluate an expression against a set of bindings.
    ///
    /// Used for watch expressions and log message placeholders.
    fn evaluate(
        &self,
        expression: &str,
        _bindings: &[(String, Self::Value)],
    ) -> Slot<Self::Value> {
        Err(AccessError::Unsupported(format!("cannot evaluate `{expression}`")))
    }
}
