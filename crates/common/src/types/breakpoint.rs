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

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
    str::FromStr,
    sync::Arc,
};

use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::normalize_expression;

/// Predicate over a binding name or key
pub type NamePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Fidelity level requested by a breakpoint.
/// Drives both the frame walk and the reduction applied to the finished snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Full inspection: every frame with its variables
    Full,
    /// Log point: innermost frame variables only
    LogPoint,
    /// Frame metadata without variables
    TraceOnly,
    /// Bare call-site coordinates
    StackOnly,
    /// Bare call-site coordinates, for profiling
    Profile,
}

impl CaptureKind {
    /// All capture kinds, from highest to lowest fidelity
    pub const ALL: [Self; 5] =
        [Self::Full, Self::LogPoint, Self::TraceOnly, Self::StackOnly, Self::Profile];

    /// Stable name, also used as the `capture_kind` tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::LogPoint => "log_point",
            Self::TraceOnly => "trace_only",
            Self::StackOnly => "stack_only",
            Self::Profile => "profile",
        }
    }

    /// Whether the innermost frame's locals need to be expanded
    pub fn expands_locals(&self) -> bool {
        matches!(self, Self::Full | Self::LogPoint)
    }

    /// Whether caller frames' locals need to be expanded
    pub fn expands_deeper_frames(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "full" | "inspect" | "stack" => Ok(Self::Full),
            "log_point" | "logpoint" | "log" => Ok(Self::LogPoint),
            "trace_only" | "trace" => Ok(Self::TraceOnly),
            "stack_only" | "no_frame" => Ok(Self::StackOnly),
            "profile" => Ok(Self::Profile),
            _ => bail!("Unknown capture kind: {s}"),
        }
    }
}

/// Everything the engine needs to know about the breakpoint that fired.
#[derive(Clone)]
pub struct BreakpointDescriptor {
    /// Breakpoint identifier
    pub id: String,
    /// Requested fidelity
    pub capture_kind: CaptureKind,
    /// File the breakpoint is set in
    pub source_file: String,
    /// Line the breakpoint is set on (1-based)
    pub line_number: u32,
    /// Caller-supplied metadata copied into the snapshot tags
    pub extra_tags: BTreeMap<String, String>,
    /// Workspace the breakpoint belongs to
    pub workspace_id: Option<String>,
    /// Message template of a log point (`"x is {x}"`)
    pub log_message: Option<String>,
    /// Level the rendered log message is emitted at
    pub log_level: Level,
    /// Watch expressions, `(name, expression)`
    pub watches: Vec<(String, String)>,
    blacklist: Option<NamePredicate>,
    skiplist: Option<NamePredicate>,
}

impl fmt::Debug for BreakpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointDescriptor")
            .field("id", &self.id)
            .field("capture_kind", &self.capture_kind)
            .field("source_file", &self.source_file)
            .field("line_number", &self.line_number)
            .field("extra_tags", &self.extra_tags)
            .field("workspace_id", &self.workspace_id)
            .field("log_message", &self.log_message)
            .field("watches", &self.watches)
            .field("has_blacklist", &self.blacklist.is_some())
            .field("has_skiplist", &self.skiplist.is_some())
            .finish()
    }
}

impl BreakpointDescriptor {
    /// Create a descriptor without predicates, tags or watches
    pub fn new(
        id: impl Into<String>,
        capture_kind: CaptureKind,
        source_file: impl Into<String>,
        line_number: u32,
    ) -> Self {
        Self {
            id: id.into(),
            capture_kind,
            source_file: source_file.into(),
            line_number,
            extra_tags: BTreeMap::new(),
            workspace_id: None,
            log_message: None,
            log_level: Level::INFO,
            watches: Vec::new(),
            blacklist: None,
            skiplist: None,
        }
    }

    /// Redact every binding for which the predicate holds
    pub fn with_blacklist(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.blacklist = Some(Arc::new(predicate));
        self
    }

    /// Redact the given binding names
    pub fn with_blacklisted_names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.with_blacklist(move |name| names.contains(name))
    }

    /// Skip every keyed member for which the predicate holds
    pub fn with_skiplist(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.skiplist = Some(Arc::new(predicate));
        self
    }

    /// Skip the given member keys
    pub fn with_skipped_keys<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        self.with_skiplist(move |key| keys.contains(key))
    }

    /// Add an extra tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_tags.insert(key.into(), value.into());
        self
    }

    /// Set the workspace id
    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Set the log message template and level
    pub fn with_log_message(mut self, template: impl Into<String>, level: Level) -> Self {
        self.log_message = Some(template.into());
        self.log_level = level;
        self
    }

    /// Add a named watch expression
    pub fn with_watch(mut self, name: impl Into<String>, expression: &str) -> Self {
        self.watches.push((name.into(), normalize_expression(expression)));
        self
    }

    /// Whether the binding name must be redacted
    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklist.as_ref().is_some_and(|p| p(name))
    }

    /// Whether the member key must be skipped
    pub fn is_skipped(&self, key: &str) -> bool {
        self.skiplist.as_ref().is_some_and(|p| p(key))
    }

    /// Blacklist predicate, if any
    pub fn blacklist(&self) -> Option<&NamePredicate> {
        self.blacklist.as_ref()
    }

    /// Skiplist predicate, if any
    pub fn skiplist(&self) -> Option<&NamePredicate> {
        self.skiplist.as_ref()
    }
}

/// Serializable breakpoint definition, as found in scenario and config files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakpointSpec {
    /// Breakpoint identifier
    pub id: String,
    /// Requested fidelity
    pub capture_kind: Option<CaptureKind>,
    /// File the breakpoint is set in
    pub source_file: String,
    /// Line the breakpoint is set on
    pub line_number: u32,
    /// Binding names to redact
    pub blacklist: Vec<String>,
    /// Member keys to skip
    pub skiplist: Vec<String>,
    /// Extra tags
    pub tags: BTreeMap<String, String>,
    /// Workspace id
    pub workspace_id: Option<String>,
    /// Log message template
    pub log_message: Option<String>,
    /// Log level name (`"info"`, `"warn"`, ...)
    pub log_level: Option<String>,
    /// Watch expressions; the expression text doubles as the watch name
    pub watches: Vec<String>,
}

impl BreakpointSpec {
    /// Build the runtime descriptor
    pub fn into_descriptor(self) -> Result<BreakpointDescriptor> {
        let kind = self.capture_kind.unwrap_or(CaptureKind::Full);
        let mut descriptor =
            BreakpointDescriptor::new(self.id, kind, self.source_file, self.line_number);

        if !self.blacklist.is_empty() {
            descriptor = descriptor.with_blacklisted_names(self.blacklist);
        }
        if !self.skiplist.is_empty() {
            descriptor = descriptor.with_skipped_keys(self.skiplist);
        }
        descriptor.extra_tags = self.tags;
        descriptor.workspace_id = self.workspace_id;

        if let Some(template) = self.log_message {
            let level = match self.log_level {
                Some(level) => {
                    Level::from_str(&level).map_err(|e| eyre!("Invalid log level {level}: {e}"))?
                }
                None => Level::INFO,
            };
            descriptor = descriptor.with_log_message(template, level);
        }

        for watch in self.watches {
            descriptor = descriptor.with_watch(watch.clone(), &watch);
        }

        Ok(descriptor)
    }
}

impl FromStr for BreakpointSpec {
    type Err = Error;

    /// Parses a compact breakpoint definition.
    /// Format: `[<kind>@]<file>:<line>`
    /// Examples:
    /// - `app.py:12` - Full capture at line 12 of app.py
    /// - `log_point@app.py:12` - Log point at the same line
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            bail!("Empty breakpoint definition");
        }

        let (kind, loc) = match trimmed.split_once('@') {
            Some((kind, loc)) => (Some(CaptureKind::from_str(kind)?), loc.trim()),
            None => (None, trimmed),
        };

        let Some((file, line)) = loc.rsplit_once(':') else {
            bail!("Invalid breakpoint format. Expected [<kind>@]<file>:<line>, got: {s}");
        };
        if file.is_empty() {
            bail!("Missing source file in breakpoint definition: {s}");
        }
        let line_number = line.parse::<u32>().map_err(|e| eyre!("Invalid line number: {e}"))?;

        Ok(Self {
            id: format!("{file}:{line_number}"),
            capture_kind: kind,
            source_file: file.to_string(),
            line_number,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_kind_from_str() {
        assert_eq!(CaptureKind::from_str("full").unwrap(), CaptureKind::Full);
        assert_eq!(CaptureKind::from_str("inspect").unwrap(), CaptureKind::Full);
        assert_eq!(CaptureKind::from_str("log-point").unwrap(), CaptureKind::LogPoint);
        assert_eq!(CaptureKind::from_str(" TRACE_ONLY ").unwrap(), CaptureKind::TraceOnly);
        assert_eq!(CaptureKind::from_str("profile").unwrap(), CaptureKind::Profile);
        assert!(CaptureKind::from_str("everything").is_err());
    }

    #[test]
    fn test_capture_kind_display_round_trips() {
        for kind in CaptureKind::ALL {
            assert_eq!(CaptureKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_capture_kind_fidelity() {
        assert!(CaptureKind::Full.expands_deeper_frames());
        assert!(!CaptureKind::LogPoint.expands_deeper_frames());
        assert!(CaptureKind::LogPoint.expands_locals());
        assert!(!CaptureKind::TraceOnly.expands_locals());
        assert!(!CaptureKind::Profile.expands_locals());
    }

    #[test]
    fn test_descriptor_predicates() {
        let bp = BreakpointDescriptor::new("bp", CaptureKind::Full, "app.py", 3)
            .with_blacklisted_names(["password"])
            .with_skipped_keys(["__dict__"]);

        assert!(bp.is_blacklisted("password"));
        assert!(!bp.is_blacklisted("user"));
        assert!(bp.is_skipped("__dict__"));
        assert!(!bp.is_skipped("name"));

        let plain = BreakpointDescriptor::new("bp", CaptureKind::Full, "app.py", 3);
        assert!(!plain.is_blacklisted("password"));
        assert!(!plain.is_skipped("__dict__"));
    }

    #[test]
    fn test_breakpoint_spec_from_str() {
        let spec = BreakpointSpec::from_str("app.py:12").unwrap();
        assert_eq!(spec.source_file, "app.py");
        assert_eq!(spec.line_number, 12);
        assert_eq!(spec.capture_kind, None);

        let spec = BreakpointSpec::from_str("log_point@src/app.py:7").unwrap();
        assert_eq!(spec.capture_kind, Some(CaptureKind::LogPoint));
        assert_eq!(spec.source_file, "src/app.py");
        assert_eq!(spec.id, "src/app.py:7");
    }

    #[test]
    fn test_breakpoint_spec_from_str_invalid() {
        assert!(BreakpointSpec::from_str("").is_err());
        assert!(BreakpointSpec::from_str("app.py").is_err());
        assert!(BreakpointSpec::from_str(":12").is_err());
        assert!(BreakpointSpec::from_str("app.py:twelve").is_err());
        assert!(BreakpointSpec::from_str("bogus@app.py:12").is_err());
    }

    #[test]
    fn test_breakpoint_spec_into_descriptor() {
        let spec = BreakpointSpec {
            id: "bp-1".into(),
            capture_kind: Some(CaptureKind::LogPoint),
            source_file: "app.py".into(),
            line_number: 9,
            blacklist: vec!["token".into()],
            log_message: Some("user is {user}".into()),
            log_level: Some("warn".into()),
            watches: vec!["user.name".into()],
            ..Default::default()
        };

        let bp = spec.into_descriptor().unwrap();
        assert_eq!(bp.capture_kind, CaptureKind::LogPoint);
        assert!(bp.is_blacklisted("token"));
        assert_eq!(bp.log_level, Level::WARN);
        assert_eq!(bp.watches, vec![("user.name".to_string(), "user.name".to_string())]);
    }

    #[test]
    fn test_breakpoint_spec_rejects_bad_log_level() {
        let spec = BreakpointSpec {
            log_message: Some("x".into()),
            log_level: Some("loud".into()),
            ..Default::default()
        };
        assert!(spec.into_descriptor().is_err());
    }
}
