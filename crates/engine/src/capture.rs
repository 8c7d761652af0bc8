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

//! Capture entry points.
//!
//! [`capture`] handles one breakpoint, [`capture_line`] every breakpoint that
//! fired on the same line. Both run the host-facing work inside a fault
//! boundary and always hand back snapshots: a panicking adapter or an
//! inconsistent table yields a degraded snapshot flagged
//! [`SnapshotFlag::CaptureFailed`], never an error in the host program.
//!
//! When several breakpoints share a line, the stack is walked once with the
//! widest plan any of them needs, and each breakpoint then gets its own copy
//! of the walk, its own watches, and its own reduction.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};

use chrono::{DateTime, Utc};
use peek_common::{
    types::{
        BreakpointDescriptor, Snapshot, SnapshotFlag, StackFrame, VariableRef, WatchResult,
        TAG_CAPTURE_ERROR,
    },
    EngineConfig,
};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    assembler::assemble,
    classify::{classify, describe, REDACTED},
    error::CaptureError,
    metrics::CaptureMetrics,
    reducer::reduce_for_breakpoint,
    runtime::{Runtime, Slot},
    table::VariableTable,
    traversal::{Expander, NamePolicy},
    walker::{FrameWalker, WalkPlan},
    watch::{emit_log, render_template, watch_names, WatchExpression},
};

/// Per-capture state, from the first frame read to the finished snapshot.
///
/// Owns the variable table and identity cache of one capture. Consuming it
/// with [`CaptureContext::into_snapshot`] or [`CaptureContext::finish`] is the
/// only way to get a snapshot out.
pub struct CaptureContext<'a, R: Runtime> {
    runtime: &'a R,
    config: &'a EngineConfig,
    policy: NamePolicy,
    started: Instant,
    captured_at: DateTime<Utc>,
    table: VariableTable,
    frames: Vec<StackFrame>,
    watches: Vec<WatchResult>,
    flags: BTreeSet<SnapshotFlag>,
    log_message: Option<String>,
    innermost: Option<R::Frame>,
    bindings: Option<Vec<(String, R::Value)>>,
}

impl<R: Runtime> Clone for CaptureContext<'_, R> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime,
            config: self.config,
            policy: self.policy.clone(),
            started: self.started,
            captured_at: self.captured_at,
            table: self.table.clone(),
            frames: self.frames.clone(),
            watches: self.watches.clone(),
            flags: self.flags.clone(),
            log_message: self.log_message.clone(),
            innermost: self.innermost.clone(),
            bindings: self.bindings.clone(),
        }
    }
}

impl<R: Runtime> fmt::Debug for CaptureContext<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureContext")
            .field("policy", &self.policy)
            .field("variables", &self.table.len())
            .field("frames", &self.frames.len())
            .field("watches", &self.watches.len())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl<'a, R: Runtime> CaptureContext<'a, R> {
    /// Fresh context whose time budget started at `started`
    pub fn new(
        runtime: &'a R,
        config: &'a EngineConfig,
        policy: NamePolicy,
        started: Instant,
    ) -> Self {
        Self {
            runtime,
            config,
            policy,
            started,
            captured_at: Utc::now(),
            table: VariableTable::new(config.max_variables),
            frames: Vec::new(),
            watches: Vec::new(),
            flags: BTreeSet::new(),
            log_message: None,
            innermost: None,
            bindings: None,
        }
    }

    /// Whether the processing time budget is spent
    pub fn time_exceeded(&self) -> bool {
        self.started.elapsed() > self.config.max_processing_time()
    }

    /// Walk the stack from `innermost` outwards
    pub fn walk(&mut self, innermost: &R::Frame, plan: WalkPlan) {
        self.innermost = Some(innermost.clone());

        let expander = Expander::new(self.runtime, self.config, &self.policy);
        let outcome = FrameWalker::new(expander, self.started).walk(
            &mut self.table,
            innermost.clone(),
            plan,
        );

        self.frames = outcome.frames;
        if outcome.time_exceeded {
            self.flags.insert(SnapshotFlag::TimeExceeded);
        }
    }

    /// Evaluate a watch against the innermost frame and expand the result.
    ///
    /// A watch whose path touches a blacklisted name is recorded redacted
    /// without being evaluated, whatever it is called.
    pub fn add_watch(&mut self, watch: &WatchExpression) {
        if self.policy.is_redacted_path(&watch.expression) {
            let expander = Expander::new(self.runtime, self.config, &self.policy);
            let root = expander.expand_redacted(&mut self.table, watch.name.clone());
            self.watches.push(WatchResult {
                name: watch.name.clone(),
                expression: watch.expression.clone(),
                root,
            });
            return;
        }
        self.load_bindings();
        let bindings = self.bindings.as_deref().unwrap_or_default();
        let result = watch.evaluate(self.runtime, bindings);
        self.push_watch(watch.name.clone(), watch.expression.clone(), result);
    }

    /// Render a log template against the innermost frame.
    ///
    /// Every placeholder that evaluates is also recorded as a watch. A
    /// placeholder naming a blacklisted binding renders as [`REDACTED`] and is
    /// never evaluated. With the time budget spent, nothing is evaluated and
    /// placeholders stay verbatim.
    pub fn render_log(&mut self, template: &str) -> String {
        if self.time_exceeded() {
            return render_template(template, |_| None);
        }

        self.load_bindings();
        let runtime = self.runtime;
        let config = self.config;
        let policy = &self.policy;
        let bindings = self.bindings.as_deref().unwrap_or_default();

        let mut rendered: HashMap<String, Option<String>> = HashMap::new();
        let mut resolved = Vec::new();
        let message = render_template(template, |expression| {
            if policy.is_redacted_path(expression) {
                return Some(REDACTED.to_string());
            }
            rendered
                .entry(expression.to_string())
                .or_insert_with(|| match runtime.evaluate(expression, bindings) {
                    Ok(value) => {
                        let tag = classify(runtime, &value, config);
                        let text = describe(runtime, &value, &tag, config).representation;
                        resolved.push((expression.to_string(), value));
                        Some(text)
                    }
                    Err(error) => {
                        debug!(expression, %error, "Log placeholder did not evaluate");
                        None
                    }
                })
                .clone()
        });

        for (expression, value) in resolved {
            self.push_watch(expression.clone(), expression, Ok(value));
        }
        message
    }

    /// Watches and log message of one breakpoint.
    ///
    /// Kinds that drop watches in reduction skip evaluating them.
    pub fn process_breakpoint(&mut self, descriptor: &BreakpointDescriptor) {
        let watches = if descriptor.capture_kind.expands_locals() {
            WatchExpression::from_descriptor(descriptor)
        } else {
            Vec::new()
        };
        if self.time_exceeded() {
            self.flags.insert(SnapshotFlag::TimeExceeded);
            if !watches.is_empty() {
                debug!(
                    breakpoint = %descriptor.id,
                    watches = %watch_names(&watches),
                    "Processing time exceeded, skipping watches"
                );
            }
        } else {
            for watch in &watches {
                self.add_watch(watch);
            }
        }

        if let Some(template) = &descriptor.log_message {
            let message = self.render_log(template);
            emit_log(descriptor.log_level, &descriptor.id, &message);
            self.log_message = Some(message);
        }
    }

    /// Assemble the snapshot
    pub fn into_snapshot(self) -> Result<Snapshot, CaptureError> {
        let mut flags = self.flags;
        if self.table.vars_exceeded() {
            flags.insert(SnapshotFlag::VarsExceeded);
        }

        let mut snapshot = assemble(
            self.frames,
            self.table.into_variables(),
            self.watches,
            flags,
            BTreeMap::new(),
        )?;
        snapshot.log_message = self.log_message;
        snapshot.captured_at = self.captured_at;
        Ok(snapshot)
    }

    /// Assemble the snapshot, degrading to frame metadata on any fault
    pub fn finish(self, fault: Option<CaptureError>) -> Snapshot {
        let runtime = self.runtime;
        let innermost = self.innermost.clone();
        let mut metadata: Vec<StackFrame> = self.frames.iter().map(metadata_only).collect();
        let mut flags = self.flags.clone();
        let log_message = self.log_message.clone();
        let captured_at = self.captured_at;

        let error = match fault {
            Some(error) => error,
            None => match self.into_snapshot() {
                Ok(snapshot) => return snapshot,
                Err(error) => error,
            },
        };

        warn!(%error, "Capture failed, returning frame metadata only");
        if metadata.is_empty() {
            if let Some(innermost) = innermost {
                metadata = guarded(|| stack_metadata(runtime, innermost)).unwrap_or_default();
            }
        }
        flags.insert(SnapshotFlag::CaptureFailed);

        Snapshot {
            frames: metadata,
            variable_table: Default::default(),
            watches: Vec::new(),
            flags,
            tags: BTreeMap::from([(TAG_CAPTURE_ERROR.to_string(), error.to_string())]),
            log_message,
            captured_at,
        }
    }

    fn load_bindings(&mut self) {
        if self.bindings.is_some() {
            return;
        }
        let bindings = match &self.innermost {
            Some(frame) => match self.runtime.locals(frame) {
                Ok(locals) => locals
                    .into_iter()
                    .filter(|(name, _)| !self.policy.is_redacted(name))
                    .filter_map(|(name, slot)| slot.ok().map(|value| (name, value)))
                    .collect(),
                Err(error) => {
                    debug!(%error, "Failed to read locals for watch evaluation");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.bindings = Some(bindings);
    }

    fn push_watch(&mut self, name: String, expression: String, result: Slot<R::Value>) {
        let expander = Expander::new(self.runtime, self.config, &self.policy);
        let root = expander
            .expand(&mut self.table, vec![(name.clone(), result)])
            .pop()
            .unwrap_or_else(|| VariableRef::placeholder(name.clone()));
        self.watches.push(WatchResult { name, expression, root });
    }
}

fn metadata_only(frame: &StackFrame) -> StackFrame {
    StackFrame { variable_ids: Vec::new(), ..frame.clone() }
}

fn stack_metadata<R: Runtime>(runtime: &R, innermost: R::Frame) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut next = Some(innermost);
    while let Some(frame) = next {
        frames.push(StackFrame::from_info(runtime.frame_info(&frame)));
        next = runtime.caller(&frame);
    }
    frames
}

/// Run host-facing work, turning a panic into a [`CaptureError`]
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, CaptureError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(CaptureError::from_panic)
}

/// Snapshot produced for one breakpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointSnapshot {
    /// Breakpoint the snapshot belongs to
    pub breakpoint_id: String,
    /// The reduced snapshot
    pub snapshot: Snapshot,
}

/// Result of capturing every breakpoint on a line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineCapture {
    /// One snapshot per processed breakpoint, in processing order
    pub snapshots: Vec<BreakpointSnapshot>,
    /// Breakpoints dropped by the per-line limit
    pub skipped: Vec<String>,
}

impl LineCapture {
    /// Snapshot of the given breakpoint
    pub fn snapshot(&self, breakpoint_id: &str) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.breakpoint_id == breakpoint_id).map(|s| &s.snapshot)
    }
}

/// Capture a snapshot for one breakpoint
pub fn capture<R: Runtime>(
    runtime: &R,
    frame: &R::Frame,
    descriptor: &BreakpointDescriptor,
    config: &EngineConfig,
) -> Snapshot {
    let started = Instant::now();
    let (context, walk_fault) =
        walk_shared(runtime, frame, std::slice::from_ref(descriptor), config, started);
    let snapshot = finish_breakpoint(context, walk_fault, descriptor);

    let metrics = CaptureMetrics::global();
    metrics.record_snapshot(descriptor.capture_kind, &snapshot);
    metrics.record_capture(started.elapsed());
    snapshot
}

/// Capture snapshots for every breakpoint that fired on the current line
pub fn capture_line<R: Runtime>(
    runtime: &R,
    frame: &R::Frame,
    descriptors: Vec<BreakpointDescriptor>,
    config: &EngineConfig,
) -> LineCapture {
    capture_line_with_rng(runtime, frame, descriptors, config, &mut rand::rng())
}

/// [`capture_line`] with an explicit random source for the per-line limit
pub fn capture_line_with_rng<R: Runtime, G: Rng + ?Sized>(
    runtime: &R,
    frame: &R::Frame,
    mut descriptors: Vec<BreakpointDescriptor>,
    config: &EngineConfig,
    rng: &mut G,
) -> LineCapture {
    let started = Instant::now();
    let metrics = CaptureMetrics::global();

    let skipped = trim_breakpoints(&mut descriptors, config.max_breakpoints_per_line, rng);
    if !skipped.is_empty() {
        metrics.record_skipped(skipped.len());
    }
    if descriptors.is_empty() {
        return LineCapture { snapshots: Vec::new(), skipped };
    }

    let (base, walk_fault) = walk_shared(runtime, frame, &descriptors, config, started);
    let snapshots = descriptors
        .iter()
        .map(|descriptor| {
            let snapshot = finish_breakpoint(base.clone(), walk_fault.clone(), descriptor);
            metrics.record_snapshot(descriptor.capture_kind, &snapshot);
            BreakpointSnapshot { breakpoint_id: descriptor.id.clone(), snapshot }
        })
        .collect();

    metrics.record_capture(started.elapsed());
    LineCapture { snapshots, skipped }
}

/// Keep at most `max` breakpoints, chosen at random. Returns the ids dropped.
fn trim_breakpoints<G: Rng + ?Sized>(
    descriptors: &mut Vec<BreakpointDescriptor>,
    max: usize,
    rng: &mut G,
) -> Vec<String> {
    if descriptors.len() <= max {
        return Vec::new();
    }

    descriptors.shuffle(rng);
    let skipped: Vec<String> = descriptors.split_off(max).into_iter().map(|d| d.id).collect();
    warn!(
        fired = descriptors.len() + skipped.len(),
        max,
        skipped = ?skipped,
        "Too many breakpoints on one line, skipping some"
    );
    skipped
}

fn walk_shared<'a, R: Runtime>(
    runtime: &'a R,
    frame: &R::Frame,
    descriptors: &[BreakpointDescriptor],
    config: &'a EngineConfig,
    started: Instant,
) -> (CaptureContext<'a, R>, Option<CaptureError>) {
    let policy = NamePolicy::union(descriptors);
    let plan = WalkPlan::for_kinds(descriptors.iter().map(|d| d.capture_kind));
    let mut context = CaptureContext::new(runtime, config, policy, started);
    let fault = guarded(|| context.walk(frame, plan)).err();
    (context, fault)
}

fn finish_breakpoint<R: Runtime>(
    mut context: CaptureContext<'_, R>,
    walk_fault: Option<CaptureError>,
    descriptor: &BreakpointDescriptor,
) -> Snapshot {
    let fault = walk_fault.or_else(|| guarded(|| context.process_breakpoint(descriptor)).err());
    reduce_for_breakpoint(context.finish(fault), descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRuntime;
    use peek_common::types::{CaptureKind, VariableFlag, TAG_BREAKPOINT_ID};
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    fn runtime() -> SimRuntime {
        SimRuntime::from_value(json!({
            "heap": [
                {"kind": "object", "class": "User", "fields": {"name": "ann", "token": "s3cr3t"}},
            ],
            "stack": [
                {"function": "handle", "file": "app.py", "line": 12,
                 "locals": {"count": 3, "user": {"ref": 0}}},
                {"function": "main", "file": "app.py", "line": 40, "locals": {"argv": "x"}},
            ]
        }))
        .unwrap()
    }

    fn descriptor(id: &str, kind: CaptureKind) -> BreakpointDescriptor {
        BreakpointDescriptor::new(id, kind, "app.py", 12)
    }

    #[test]
    fn test_context_into_snapshot() {
        let rt = runtime();
        let config = EngineConfig::default();
        let mut context =
            CaptureContext::new(&rt, &config, NamePolicy::default(), Instant::now());
        context.walk(&0, WalkPlan::for_kind(CaptureKind::Full));
        context.add_watch(&WatchExpression::new("name", "user.name"));

        let snapshot = context.into_snapshot().unwrap();
        assert_eq!(snapshot.frames.len(), 2);
        assert_eq!(snapshot.watches.len(), 1);
        let watched = snapshot.resolve(&snapshot.watches[0].root).unwrap();
        assert_eq!(watched.representation, "ann");
        assert!(snapshot.dangling_refs().is_empty());
    }

    #[test]
    fn test_failed_watch_is_captured_as_error() {
        let rt = runtime();
        let config = EngineConfig::default();
        let snapshot = capture(
            &rt,
            &0,
            &descriptor("bp", CaptureKind::Full).with_watch("missing", "nobody.home"),
            &config,
        );

        let watch = snapshot.resolve(&snapshot.watches[0].root).unwrap();
        assert!(watch.has_flag(VariableFlag::Error));
        assert!(watch.representation.contains("NameError"));
    }

    #[test]
    fn test_log_message_renders_and_records_watches() {
        let rt = runtime();
        let config = EngineConfig::default();
        let snapshot = capture(
            &rt,
            &0,
            &descriptor("bp", CaptureKind::LogPoint)
                .with_log_message("{user.name} has {count} items, {nope}", tracing::Level::INFO),
            &config,
        );

        assert_eq!(
            snapshot.log_message.as_deref(),
            Some("[peek] ann has 3 items, {nope}")
        );
        let names: Vec<_> = snapshot.watches.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["user.name", "count"]);
    }

    fn secret_runtime() -> SimRuntime {
        SimRuntime::from_value(json!({
            "heap": [{"kind": "object", "class": "Session", "fields": {"token": "s3cr3t"}}],
            "stack": [
                {"function": "handle", "file": "app.py", "line": 12,
                 "locals": {"holder": {"ref": 0}, "token": "s3cr3t"}},
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_log_placeholder_never_renders_blacklisted_local() {
        let rt = secret_runtime();
        let config = EngineConfig::default();
        let snapshot = capture(
            &rt,
            &0,
            &descriptor("bp", CaptureKind::LogPoint)
                .with_blacklisted_names(["token"])
                .with_log_message("tok={token} held={holder.token}", tracing::Level::INFO),
            &config,
        );

        assert_eq!(
            snapshot.log_message.as_deref(),
            Some("[peek] tok=[REDACTED] held=[REDACTED]")
        );
        assert!(snapshot.watches.is_empty());
        assert!(!serde_json::to_string(&snapshot).unwrap().contains("s3cr3t"));
    }

    #[test]
    fn test_aliased_watch_is_redacted() {
        let rt = secret_runtime();
        let config = EngineConfig::default();
        let snapshot = capture(
            &rt,
            &0,
            &descriptor("bp", CaptureKind::Full)
                .with_blacklisted_names(["token"])
                .with_watch("t", "token")
                .with_watch("h", "holder.token"),
            &config,
        );

        assert_eq!(snapshot.watches.len(), 2);
        for watch in &snapshot.watches {
            let root = snapshot.resolve(&watch.root).unwrap();
            assert!(root.has_flag(VariableFlag::Redacted));
            assert_eq!(root.representation, REDACTED);
        }
        assert!(!serde_json::to_string(&snapshot).unwrap().contains("s3cr3t"));
    }

    #[test]
    fn test_spent_budget_skips_watches_and_placeholders() {
        let rt = runtime();
        let config = EngineConfig::default();
        let stale = Instant::now().checked_sub(std::time::Duration::from_secs(5));
        let Some(stale) = stale else { return };

        let policy = NamePolicy::default();
        let mut context = CaptureContext::new(&rt, &config, policy, stale);
        context.walk(&0, WalkPlan::for_kind(CaptureKind::Full));
        context.process_breakpoint(
            &descriptor("bp", CaptureKind::Full)
                .with_watch("n", "count")
                .with_log_message("count={count}", tracing::Level::INFO),
        );
        let snapshot = context.into_snapshot().unwrap();

        assert!(snapshot.has_flag(SnapshotFlag::TimeExceeded));
        assert!(snapshot.watches.is_empty());
        assert!(snapshot.variable_table.is_empty());
        assert_eq!(snapshot.log_message.as_deref(), Some("[peek] count={count}"));
    }

    #[test]
    fn test_trim_breakpoints() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut descriptors: Vec<_> =
            (0..5).map(|i| descriptor(&format!("bp-{i}"), CaptureKind::Full)).collect();
        let skipped = trim_breakpoints(&mut descriptors, 3, &mut rng);

        assert_eq!(descriptors.len(), 3);
        assert_eq!(skipped.len(), 2);
        let mut all: Vec<_> = descriptors.iter().map(|d| d.id.clone()).chain(skipped).collect();
        all.sort();
        assert_eq!(all, vec!["bp-0", "bp-1", "bp-2", "bp-3", "bp-4"]);

        let mut few = vec![descriptor("only", CaptureKind::Full)];
        assert!(trim_breakpoints(&mut few, 3, &mut rng).is_empty());
    }

    #[test]
    fn test_poisoned_host_degrades_to_metadata() {
        let rt = SimRuntime::from_value(json!({
            "heap": [{"kind": "poison", "message": "adapter crashed"}],
            "stack": [
                {"function": "handle", "file": "app.py", "line": 12, "locals": {"p": {"ref": 0}}},
                {"function": "main", "file": "app.py", "line": 40},
            ]
        }))
        .unwrap();
        let config = EngineConfig::default();
        let snapshot = capture(&rt, &0, &descriptor("bp", CaptureKind::Full), &config);

        assert!(snapshot.has_flag(SnapshotFlag::CaptureFailed));
        assert!(snapshot.variable_table.is_empty());
        assert_eq!(snapshot.frames.len(), 2);
        assert_eq!(snapshot.frames[1].function_name, "main");
        assert!(snapshot.tag(TAG_CAPTURE_ERROR).unwrap().contains("adapter crashed"));
        assert_eq!(snapshot.tag(TAG_BREAKPOINT_ID), Some("bp"));
    }

    #[test]
    fn test_line_capture_keeps_breakpoints_apart() {
        let rt = runtime();
        let config = EngineConfig::default();
        let line = capture_line(
            &rt,
            &0,
            vec![
                descriptor("full", CaptureKind::Full).with_watch("n", "count"),
                descriptor("trace", CaptureKind::TraceOnly),
            ],
            &config,
        );

        assert!(line.skipped.is_empty());
        let full = line.snapshot("full").unwrap();
        let trace = line.snapshot("trace").unwrap();
        assert_eq!(full.watches.len(), 1);
        assert!(!full.variable_table.is_empty());
        assert!(trace.watches.is_empty());
        assert!(trace.variable_table.is_empty());
        assert_eq!(trace.frames.len(), 2);
    }
}
