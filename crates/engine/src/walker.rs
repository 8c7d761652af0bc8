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

//! Stack walk from the innermost frame outwards.
//!
//! Every frame is recorded with its metadata. Whether its locals are expanded
//! depends on the [`WalkPlan`] and on the time budget, which is checked once
//! per frame before expansion starts. Once the budget is spent, the remaining
//! frames are still recorded, just without variables.

use std::time::{Duration, Instant};

use peek_common::types::{CaptureKind, StackFrame, VariableRef};
use tracing::{debug, trace};

use crate::{runtime::Runtime, table::VariableTable, traversal::Expander};

/// Binding name used when a frame's locals cannot be read at all
pub const LOCALS_ERROR_NAME: &str = "<locals>";

/// Which frames get their locals expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalkPlan {
    /// Expand the innermost frame's locals
    pub expand_locals: bool,
    /// Expand the locals of every caller frame as well
    pub capture_deeper_frames: bool,
}

impl WalkPlan {
    /// Plan for a single capture kind
    pub fn for_kind(kind: CaptureKind) -> Self {
        Self {
            expand_locals: kind.expands_locals(),
            capture_deeper_frames: kind.expands_deeper_frames(),
        }
    }

    /// Plan covering several capture kinds at once
    pub fn for_kinds(kinds: impl IntoIterator<Item = CaptureKind>) -> Self {
        kinds.into_iter().map(Self::for_kind).fold(Self::default(), |acc, plan| Self {
            expand_locals: acc.expand_locals || plan.expand_locals,
            capture_deeper_frames: acc.capture_deeper_frames || plan.capture_deeper_frames,
        })
    }

    fn wants_locals(&self, frame_index: usize) -> bool {
        self.expand_locals && (frame_index == 0 || self.capture_deeper_frames)
    }
}

/// Frames of one walk
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Frames, innermost first
    pub frames: Vec<StackFrame>,
    /// Whether some frame was left without variables because of the time budget
    pub time_exceeded: bool,
}

enum WalkState<F> {
    EnterFrame(F),
    CheckBudget(F, StackFrame),
    ExpandVars(F, StackFrame),
    SkipVars(F, StackFrame),
    NextFrame(F),
    Done,
}

/// Walks the paused stack and expands frame locals
pub struct FrameWalker<'a, R: Runtime> {
    expander: Expander<'a, R>,
    started: Instant,
    budget: Duration,
}

impl<'a, R: Runtime> FrameWalker<'a, R> {
    /// Create a walker whose time budget started at `started`
    pub fn new(expander: Expander<'a, R>, started: Instant) -> Self {
        let budget = expander.config().max_processing_time();
        Self { expander, started, budget }
    }

    /// Whether the processing time budget is spent
    pub fn time_exceeded(&self) -> bool {
        self.started.elapsed() > self.budget
    }

    /// Walk from `innermost` to the outermost frame
    pub fn walk(
        &self,
        table: &mut VariableTable,
        innermost: R::Frame,
        plan: WalkPlan,
    ) -> WalkOutcome {
        let runtime = self.expander.runtime();
        let mut outcome = WalkOutcome::default();
        let mut state = WalkState::EnterFrame(innermost);

        loop {
            state = match state {
                WalkState::EnterFrame(frame) => {
                    let info = runtime.frame_info(&frame);
                    trace!(frame = %info, "Entering frame");
                    WalkState::CheckBudget(frame, StackFrame::from_info(info))
                }
                WalkState::CheckBudget(frame, stack_frame) => {
                    if !plan.wants_locals(outcome.frames.len()) {
                        WalkState::SkipVars(frame, stack_frame)
                    } else if self.time_exceeded() {
                        if !outcome.time_exceeded {
                            debug!(
                                budget_ms = self.budget.as_millis() as u64,
                                frame = outcome.frames.len(),
                                "Processing time exceeded, skipping variables"
                            );
                        }
                        outcome.time_exceeded = true;
                        WalkState::SkipVars(frame, stack_frame)
                    } else {
                        WalkState::ExpandVars(frame, stack_frame)
                    }
                }
                WalkState::ExpandVars(frame, mut stack_frame) => {
                    stack_frame.variable_ids = self.expand_locals(table, &frame);
                    outcome.frames.push(stack_frame);
                    WalkState::NextFrame(frame)
                }
                WalkState::SkipVars(frame, stack_frame) => {
                    outcome.frames.push(stack_frame);
                    WalkState::NextFrame(frame)
                }
                WalkState::NextFrame(frame) => match runtime.caller(&frame) {
                    Some(caller) => WalkState::EnterFrame(caller),
                    None => WalkState::Done,
                },
                WalkState::Done => break,
            };
        }

        outcome
    }

    fn expand_locals(
        &self,
        table: &mut VariableTable,
        frame: &R::Frame,
    ) -> Vec<VariableRef> {
        match self.expander.runtime().locals(frame) {
            Ok(bindings) => self.expander.expand(table, bindings),
            Err(error) => {
                debug!(%error, "Failed to read frame locals");
                vec![self.expander.expand_error(table, LOCALS_ERROR_NAME.to_string(), &error)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sim::SimRuntime, traversal::NamePolicy};
    use peek_common::EngineConfig;
    use serde_json::json;

    fn runtime() -> SimRuntime {
        SimRuntime::from_value(json!({
            "stack": [
                {"function": "inner", "file": "a.py", "line": 3, "locals": {"x": 1}},
                {"function": "middle", "file": "a.py", "line": 9, "locals": {"y": 2}},
                {"function": "outer", "file": "b.py", "line": 20, "locals": {"z": 3}},
            ]
        }))
        .unwrap()
    }

    fn walk(started: Instant, plan: WalkPlan) -> (WalkOutcome, VariableTable) {
        let rt = runtime();
        let config = EngineConfig::default();
        let policy = NamePolicy::default();
        let mut table = VariableTable::new(config.max_variables);
        let walker = FrameWalker::new(Expander::new(&rt, &config, &policy), started);
        let outcome = walker.walk(&mut table, 0, plan);
        (outcome, table)
    }

    #[test]
    fn test_plan_union() {
        let plan = WalkPlan::for_kinds([CaptureKind::TraceOnly, CaptureKind::LogPoint]);
        assert!(plan.expand_locals);
        assert!(!plan.capture_deeper_frames);
        assert_eq!(WalkPlan::for_kinds(std::iter::empty()), WalkPlan::default());
        assert_eq!(
            WalkPlan::for_kinds([CaptureKind::Profile, CaptureKind::Full]),
            WalkPlan::for_kind(CaptureKind::Full)
        );
    }

    #[test]
    fn test_full_walk_expands_every_frame() {
        let (outcome, table) = walk(Instant::now(), WalkPlan::for_kind(CaptureKind::Full));
        assert!(!outcome.time_exceeded);
        let names: Vec<_> = outcome.frames.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(names, vec!["inner", "middle", "outer"]);
        assert!(outcome.frames.iter().all(|f| f.variable_ids.len() == 1));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_log_point_walk_expands_innermost_only() {
        let (outcome, table) = walk(Instant::now(), WalkPlan::for_kind(CaptureKind::LogPoint));
        assert_eq!(outcome.frames.len(), 3);
        assert_eq!(outcome.frames[0].variable_ids.len(), 1);
        assert!(outcome.frames[1].variable_ids.is_empty());
        assert!(outcome.frames[2].variable_ids.is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_trace_walk_records_metadata_only() {
        let (outcome, table) = walk(Instant::now(), WalkPlan::for_kind(CaptureKind::TraceOnly));
        assert_eq!(outcome.frames.len(), 3);
        assert_eq!(outcome.frames[2].source_file, "b.py");
        assert!(table.is_empty());
        assert!(!outcome.time_exceeded);
    }

    #[test]
    fn test_spent_budget_skips_variables() {
        let stale = Instant::now().checked_sub(Duration::from_secs(5)).unwrap_or_else(Instant::now);
        let (outcome, table) = walk(stale, WalkPlan::for_kind(CaptureKind::Full));
        assert!(outcome.time_exceeded);
        assert_eq!(outcome.frames.len(), 3);
        assert!(outcome.frames.iter().all(|f| f.variable_ids.is_empty()));
        assert!(table.is_empty());
    }
}
