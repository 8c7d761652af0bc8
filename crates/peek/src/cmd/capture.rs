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


//! Capture command - run one line capture against a scenario

use std::str::FromStr;

use eyre::{eyre, Result};
use peek_common::types::{BreakpointDescriptor, BreakpointSpec, CaptureKind};
use peek_engine::{capture_line, sim::SimRuntime, CaptureMetrics, LineCapture, MetricsSummary};
use serde::Serialize;
use tracing::{info, warn};

use crate::CaptureArgs;

/// What the capture command prints
#[derive(Debug, Serialize)]
struct CaptureReport {
    #[serde(flatten)]
    capture: LineCapture,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<MetricsSummary>,
}

/// Capture every breakpoint of the scenario at its innermost frame
pub fn run(args: &CaptureArgs) -> Result<()> {
    let config = args.config.engine_config()?;
    let runtime = SimRuntime::load(&args.scenario)?;
    let frame = runtime
        .innermost_frame()
        .ok_or_else(|| eyre!("Scenario {} has an empty stack", args.scenario.display()))?;

    let descriptors = descriptors(&runtime, args)?;
    info!(
        scenario = %args.scenario.display(),
        breakpoints = descriptors.len(),
        "Capturing snapshots"
    );

    let capture = capture_line(&runtime, &frame, descriptors, &config);
    for id in &capture.skipped {
        warn!(breakpoint = %id, "Breakpoint skipped by the per-line limit");
    }

    let report = CaptureReport {
        capture,
        metrics: args.metrics.then(|| CaptureMetrics::global().summary()),
    };
    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");
    Ok(())
}

/// Scenario breakpoints plus command line breakpoints, with overrides applied.
/// Falls back to one full capture at the innermost frame.
fn descriptors(runtime: &SimRuntime, args: &CaptureArgs) -> Result<Vec<BreakpointDescriptor>> {
    let mut descriptors = runtime.descriptors()?;
    for definition in &args.breakpoints {
        descriptors.push(BreakpointSpec::from_str(definition)?.into_descriptor()?);
    }

    if descriptors.is_empty() {
        let top = runtime
            .scenario()
            .stack
            .first()
            .ok_or_else(|| eyre!("Scenario has no frames to break in"))?;
        descriptors.push(BreakpointDescriptor::new(
            "bp-1",
            CaptureKind::Full,
            top.file.clone(),
            top.line,
        ));
    }

    if let Some(kind) = &args.kind {
        let kind = CaptureKind::from_str(kind)?;
        for descriptor in &mut descriptors {
            descriptor.capture_kind = kind;
        }
    }

    Ok(descriptors
        .into_iter()
        .map(|d| args.watches.iter().fold(d, |d, watch| d.with_watch(watch.clone(), watch)))
        .collect())
}
