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

//! Value classification and rendering.
//!
//! Every host value maps onto exactly one [`Category`], and every category has
//! one expansion rule in the traversal. Classification is pure and total:
//! shapes the engine does not know about end up as [`Category::NoExpand`].

use peek_common::{
    types::{Category, TypeTag, VariableFlag},
    EngineConfig,
};

use crate::runtime::{Runtime, ValueView};

/// Marker used in place of a redacted value
pub const REDACTED: &str = "[REDACTED]";

/// Suffix appended to truncated representations
pub const TRUNCATION_MARKER: &str = "...";

/// Category of a value shape, before the no-expand type list is applied
pub fn classify_view(view: &ValueView<'_>) -> Category {
    match view {
        ValueView::Null
        | ValueView::Bool(_)
        | ValueView::Int(_)
        | ValueView::Float(_)
        | ValueView::Number(_) => Category::Scalar,
        ValueView::Str(_) => Category::StringLike,
        ValueView::Sequence => Category::OrderedCollection,
        ValueView::Iterator => Category::ConsumableIterator,
        ValueView::Mapping | ValueView::Object => Category::KeyedComposite,
        ValueView::Error { .. } => Category::ErrorLike,
        ValueView::Opaque => Category::NoExpand,
    }
}

/// Classify a host value
pub fn classify<R: Runtime>(runtime: &R, value: &R::Value, config: &EngineConfig) -> TypeTag {
    let type_name = runtime.type_name(value);
    let category = match classify_view(&runtime.view(value)) {
        category if category.is_composite() && config.is_no_expand(&type_name) => {
            Category::NoExpand
        }
        category => category,
    };
    TypeTag::new(category, type_name)
}

/// Rendering of a single value, before any children are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    /// Truncation-safe representation
    pub representation: String,
    /// Element count of sized collections
    pub size: Option<usize>,
    /// Flags implied by the rendering
    pub flags: Vec<VariableFlag>,
}

/// Render a classified value
pub fn describe<R: Runtime>(
    runtime: &R,
    value: &R::Value,
    tag: &TypeTag,
    config: &EngineConfig,
) -> Description {
    let view = runtime.view(value);
    let mut size = None;
    let mut flags = Vec::new();

    let text = match tag.category {
        Category::Scalar | Category::StringLike => render_plain(&view, &tag.type_name),
        Category::NoExpand => match view {
            ValueView::Sequence
            | ValueView::Iterator
            | ValueView::Mapping
            | ValueView::Object
            | ValueView::Error { .. }
            | ValueView::Opaque => {
                runtime.display(value).unwrap_or_else(|| format!("<{}>", tag.type_name))
            }
            _ => render_plain(&view, &tag.type_name),
        },
        Category::OrderedCollection => {
            flags.push(VariableFlag::Collection);
            size = runtime.collection_len(value);
            size_marker(size, &tag.type_name)
        }
        Category::ConsumableIterator => {
            flags.push(VariableFlag::Collection);
            tag.type_name.clone()
        }
        Category::KeyedComposite if matches!(view, ValueView::Mapping) => {
            flags.push(VariableFlag::Collection);
            size = runtime.collection_len(value);
            size_marker(size, &tag.type_name)
        }
        Category::KeyedComposite => {
            runtime.display(value).unwrap_or_else(|| tag.type_name.clone())
        }
        Category::ErrorLike => match view {
            ValueView::Error { message } => message.into_owned(),
            _ => tag.type_name.clone(),
        },
    };

    let (representation, truncated) = truncate(&text, config.max_string_length);
    if truncated {
        flags.push(VariableFlag::Truncated);
    }

    Description { representation, size, flags }
}

fn render_plain(view: &ValueView<'_>, type_name: &str) -> String {
    match view {
        ValueView::Null => "null".to_string(),
        ValueView::Bool(b) => b.to_string(),
        ValueView::Int(i) => i.to_string(),
        ValueView::Float(f) => format!("{f:?}"),
        ValueView::Number(n) => n.to_string(),
        ValueView::Str(s) => s.to_string(),
        ValueView::Error { message } => message.to_string(),
        _ => format!("<{type_name}>"),
    }
}

fn size_marker(size: Option<usize>, type_name: &str) -> String {
    match size {
        Some(n) => format!("Size: {n}"),
        None => type_name.to_string(),
    }
}

/// Cut `text` down to at most `max_len` characters, marker included.
///
/// Returns the possibly shortened text and whether it was cut. Cuts always land
/// on a character boundary and end in [`TRUNCATION_MARKER`] when the limit
/// leaves room for it.
pub fn truncate(text: &str, max_len: usize) -> (String, bool) {
    if text.chars().nth(max_len).is_none() {
        return (text.to_string(), false);
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    let (keep, marker) = if max_len > marker_len {
        (max_len - marker_len, TRUNCATION_MARKER)
    } else {
        (max_len, "")
    };
    let cut = text.char_indices().nth(keep).map_or(text.len(), |(i, _)| i);
    (format!("{}{marker}", &text[..cut]), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_classify_view_is_total() {
        assert_eq!(classify_view(&ValueView::Null), Category::Scalar);
        assert_eq!(classify_view(&ValueView::Bool(true)), Category::Scalar);
        assert_eq!(classify_view(&ValueView::Int(-3)), Category::Scalar);
        assert_eq!(classify_view(&ValueView::Float(0.5)), Category::Scalar);
        assert_eq!(classify_view(&ValueView::Number(Cow::Borrowed("1e400"))), Category::Scalar);
        assert_eq!(classify_view(&ValueView::Str(Cow::Borrowed("x"))), Category::StringLike);
        assert_eq!(classify_view(&ValueView::Sequence), Category::OrderedCollection);
        assert_eq!(classify_view(&ValueView::Iterator), Category::ConsumableIterator);
        assert_eq!(classify_view(&ValueView::Mapping), Category::KeyedComposite);
        assert_eq!(classify_view(&ValueView::Object), Category::KeyedComposite);
        assert_eq!(
            classify_view(&ValueView::Error { message: Cow::Borrowed("boom") }),
            Category::ErrorLike
        );
        assert_eq!(classify_view(&ValueView::Opaque), Category::NoExpand);
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate("hello", 5), ("hello".to_string(), false));
        assert_eq!(truncate("", 0), (String::new(), false));
    }

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate("hello world", 5), ("he...".to_string(), true));
        assert_eq!(truncate("hello world", 8), ("hello...".to_string(), true));
    }

    #[test]
    fn test_truncate_never_exceeds_limit() {
        for max_len in 0..12 {
            let (text, truncated) = truncate("hello wonderful world", max_len);
            assert!(truncated);
            assert!(text.chars().count() <= max_len, "{text:?} longer than {max_len}");
        }
        assert_eq!(truncate("hello", 2), ("he".to_string(), true));
        assert_eq!(truncate("hello", 3), ("hel".to_string(), true));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let (text, truncated) = truncate("ééééé", 4);
        assert!(truncated);
        assert_eq!(text, "é...");
    }

    #[test]
    fn test_render_plain() {
        assert_eq!(render_plain(&ValueView::Null, "none"), "null");
        assert_eq!(render_plain(&ValueView::Float(1.0), "float"), "1.0");
        assert_eq!(render_plain(&ValueView::Opaque, "socket"), "<socket>");
    }
}
