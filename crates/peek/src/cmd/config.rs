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


//! Config command - print the effective engine configuration as TOML

use eyre::{eyre, Result};

use crate::ConfigArgs;

/// Print the configuration after file loading and overrides
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = args.engine_config()?;
    let text = toml::to_string_pretty(&config)
        .map_err(|e| eyre!("Failed to render engine configuration: {e}"))?;
    print!("{text}");
    Ok(())
}
