// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use std::path::Path;

/// Splits a todo file into instructions: one per line, blank lines and
/// `#` comments skipped.
pub fn instructions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_instructions(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    Ok(instructions(&std::fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blanks_and_comments() {
        let text = "# weekend\nOrganize 'downloads'\n\n   \n  Add 2 and 3  \n#done\n";
        assert_eq!(instructions(text), vec!["Organize 'downloads'", "Add 2 and 3"]);
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todo.txt");
        std::fs::write(&path, "first\nsecond\n").unwrap();
        assert_eq!(read_instructions(&path).unwrap().len(), 2);
        assert!(read_instructions(dir.path().join("absent.txt")).is_err());
    }
}
