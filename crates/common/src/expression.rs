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

/// Normalize an expression by replacing any contiguous whitespace with a single space
pub fn normalize_expression(expr: &str) -> String {
    expr.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_expression_mixed_whitespace() {
        assert_eq!(normalize_expression("a  \t\n  b \r\n c"), "a b c");
        assert_eq!(normalize_expression("   "), "");
    }

    #[test]
    fn test_normalize_expression_dotted_path() {
        assert_eq!(normalize_expression("  user.name  "), "user.name");
    }
}
