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

//! Watch expressions and log point messages.
//!
//! Watches are evaluated against the innermost frame's locals through
//! [`Runtime::evaluate`]. Their results are expanded like any other root, and a
//! failed evaluation is captured as an error-marked variable rather than
//! dropped.
//!
//! Log messages are templates with `{expression}` placeholders. Each
//! placeholder that evaluates is substituted and also recorded as a watch;
//! the rest stay in the message verbatim.

use itertools::Itertools;
use peek_common::{normalize_expression, types::BreakpointDescriptor};
use tracing::{debug, error, info, trace, warn, Level};

use crate::runtime::{Runtime, Slot};

/// Prefix of every rendered log point message
pub const LOG_PREFIX: &str = "[peek]";

/// A named expression evaluated when a breakpoint fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchExpression {
    /// Display name of the watch
    pub name: String,
    /// Normalized expression text
    pub expression: String,
}

impl WatchExpression {
    /// Create a watch expression
    pub fn new(name: impl Into<String>, expression: &str) -> Self {
        Self { name: name.into(), expression: normalize_expression(expression) }
    }

    /// Watches configured on a breakpoint
    pub fn from_descriptor(descriptor: &BreakpointDescriptor) -> Vec<Self> {
        descriptor
            .watches
            .iter()
            .map(|(name, expression)| Self::new(name.clone(), expression))
            .collect()
    }

    /// Evaluate against the given bindings
    pub fn evaluate<R: Runtime>(
        &self,
        runtime: &R,
        bindings: &[(String, R::Value)],
    ) -> Slot<R::Value> {
        runtime.evaluate(&self.expression, bindings)
    }
}

/// Render a log template.
///
/// `resolve` maps a normalized placeholder expression to its rendering, or
/// `None` to keep the placeholder verbatim. `{{` and `}}` render as literal
/// braces. The result carries [`LOG_PREFIX`].
pub fn render_template(template: &str, mut resolve: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len() + LOG_PREFIX.len() + 1);
    out.push_str(LOG_PREFIX);
    out.push(' ');

    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut raw = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    raw.push(c);
                }
                let expression = normalize_expression(&raw);
                let rendered =
                    if closed && !expression.is_empty() { resolve(&expression) } else { None };
                match rendered {
                    Some(rendered) => out.push_str(&rendered),
                    None => {
                        out.push('{');
                        out.push_str(&raw);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            c => out.push(c),
        }
    }

    out
}

/// Emit a rendered log point message at the requested level
pub fn emit_log(level: Level, breakpoint_id: &str, message: &str) {
    match level {
        Level::ERROR => error!(target: "peek::logpoint", breakpoint = breakpoint_id, "{message}"),
        Level::WARN => warn!(target: "peek::logpoint", breakpoint = breakpoint_id, "{message}"),
        Level::INFO => info!(target: "peek::logpoint", breakpoint = breakpoint_id, "{message}"),
        Level::DEBUG => debug!(target: "peek::logpoint", breakpoint = breakpoint_id, "{message}"),
        _ => trace!(target: "peek::logpoint", breakpoint = breakpoint_id, "{message}"),
    }
}

/// Names of the watches, for diagnostics
pub fn watch_names(watches: &[WatchExpression]) -> String {
    watches.iter().map(|w| w.name.as_str()).join(", ")
}
