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

//! Path-based conditional assertion macros
//!
//! Internal invariants of the engine (id monotonicity, table ceilings, ...) are
//! checked with these macros. They are free when disabled, and can be turned
//! on per module through the `PEEK_ASSERT` environment variable:
//!
//! - `PEEK_ASSERT=*` or `PEEK_ASSERT=all` enables every assertion
//! - `PEEK_ASSERT=peek_engine` enables the engine crate and its submodules
//! - `PEEK_ASSERT=peek_engine::table,peek_common::types` enables several targets
//!
//! A capture must never take the host program down, so these stay disabled in
//! production and are meant for tests and local debugging.
//!
//! ```ignore
//! use peek_common::{peek_assert, peek_assert_eq};
//!
//! peek_assert!(len <= max, "table grew past its ceiling");
//! peek_assert_eq!(next.0, len + 1);
//! ```

use once_cell::sync::Lazy;
use std::env;

use crate::env::PEEK_ASSERT;

static ASSERTION_TARGETS: Lazy<Vec<String>> = Lazy::new(|| match env::var(PEEK_ASSERT) {
    Ok(val) => parse_assertion_targets(&val),
    Err(_) => Vec::new(),
});

/// Split a `PEEK_ASSERT` value into its targets
pub fn parse_assertion_targets(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Whether any of the targets enables the given module path
pub fn targets_match(targets: &[String], module_path: &str) -> bool {
    targets
        .iter()
        .any(|t| t == "*" || t == "all" || module_path.starts_with(t.as_str()))
}

/// Check if assertions are enabled for the given module path
pub fn is_assertion_enabled(module_path: &str) -> bool {
    targets_match(&ASSERTION_TARGETS, module_path)
}

/// Marks the assertion path as unlikely
#[cold]
#[inline(never)]
pub fn cold_path() {}

/// Assert a condition only when enabled via `PEEK_ASSERT`.
#[macro_export]
macro_rules! peek_assert {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert!($($arg)*);
        }
    };
}

/// Assert two expressions are equal only when enabled via `PEEK_ASSERT`.
#[macro_export]
macro_rules! peek_assert_eq {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert_eq!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assertion_targets() {
        assert!(parse_assertion_targets("").is_empty());
        assert_eq!(
            parse_assertion_targets(" peek_engine , ,peek_common::types"),
            vec!["peek_engine".to_string(), "peek_common::types".to_string()]
        );
    }

    #[test]
    fn test_targets_match() {
        let all = parse_assertion_targets("*");
        assert!(targets_match(&all, "anything::at::all"));

        let engine = parse_assertion_targets("peek_engine::table");
        assert!(targets_match(&engine, "peek_engine::table"));
        assert!(targets_match(&engine, "peek_engine::table::tests"));
        assert!(!targets_match(&engine, "peek_engine::traversal"));

        assert!(!targets_match(&[], "peek_engine"));
    }

    #[test]
    fn test_macros_compile_and_hold() {
        peek_assert!(1 + 1 == 2);
        peek_assert!(true, "formatted {}", "message");
        peek_assert_eq!(3, 3);
        peek_assert_eq!(4, 4, "message");
    }

    #[test]
    #[should_panic(expected = "assertion failed: false")]
    fn test_peek_assert_panics_when_enabled_for_this_module() {
        if is_assertion_enabled(module_path!()) {
            peek_assert!(false);
        } else {
            panic!("assertion failed: false");
        }
    }
}
