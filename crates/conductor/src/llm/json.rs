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

use serde_json::Value;
use tracing::debug;

/// Pulls the first JSON document out of free-form model output: the whole
/// text, a fenced code block, or the first balanced object or array.
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for (language, code_content) in extract_code_blocks(trimmed) {
        if language.as_deref() == Some("json") || language.is_none() {
            if let Ok(value) = serde_json::from_str::<Value>(code_content.trim()) {
                debug!("Extracted JSON from markdown code fence");
                return Some(value);
            }
        }
    }

    let object_start = trimmed.find('{');
    let array_start = trimmed.find('[');
    let order = match (object_start, array_start) {
        (Some(o), Some(a)) if a < o => [('[', ']'), ('{', '}')],
        _ => [('{', '}'), ('[', ']')],
    };
    for (open, close) in order {
        if let Some(candidate) = find_balanced(trimmed, open, close) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                debug!("Extracted JSON delimited by {open}{close}");
                return Some(value);
            }
        }
    }

    None
}

/// First balanced `open..close` span, skipping delimiters inside strings.
fn find_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn extract_code_blocks(text: &str) -> Vec<(Option<String>, String)> {
    let mut code_blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(lang_str) = line.trim().strip_prefix("```") else {
            continue;
        };
        let language = Some(lang_str.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        let mut code_content = String::new();
        for code_line in lines.by_ref() {
            if code_line.trim().starts_with("```") {
                break;
            }
            if !code_content.is_empty() {
                code_content.push('\n');
            }
            code_content.push_str(code_line);
        }
        code_blocks.push((language, code_content));
    }
    code_blocks
}

/// Strips one surrounding markdown fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    match inner.split_once('\n') {
        Some((first, rest)) if !first.trim().contains(' ') && !first.contains('(') => rest.trim(),
        _ => inner.trim(),
    }
}
