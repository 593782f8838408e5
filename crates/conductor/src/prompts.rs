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

use crate::registry::{render_signatures, FunctionSpec};
use crate::types::Subtask;
use serde_json::Value;

const PREVIEW_LIMIT: usize = 400;

pub fn decomposer_system_prompt(catalog: &[FunctionSpec], todo: Option<&str>) -> String {
    let mut prompt = format!(
        "# Task Decomposition\n\n\
        You are the first stage of a two-stage agent. Break the user's task into \
        an ordered list of small subtasks. A second stage will map every subtask \
        onto exactly one of these functions:\n\n\
        {}\n\n\
        ## Rules\n\
        - List subtasks in the exact order they must run.\n\
        - Each description must be short, concrete, and name literal values \
        (for example `path='un_organized'`) instead of vague references.\n\
        - If a subtask uses the result of an earlier subtask, set `depends_on` \
        to that subtask's 1-based position. Only earlier positions are allowed.\n\
        - Set `function` to the function you expect the subtask to use, if any.\n\
        - Set `optional` to true for subtasks the task can do without.\n\
        - If nothing needs doing, return an empty list.\n\n\
        ## Response Format\n\
        Respond with JSON only:\n\
        {{\"subtasks\": [{{\"description\": \"...\", \"function\": \"...\", \
        \"depends_on\": null, \"optional\": false}}]}}",
        render_signatures(catalog)
    );
    if let Some(todo) = todo {
        prompt.push_str(&format!(
            "\n\n## Todo File\n\
            The user may ask you to work through their todo file. Only if they do, \
            add subtasks for these entries as well:\n\n{todo}"
        ));
    }
    prompt
}

pub fn decomposer_user_prompt(instruction: &str) -> String {
    format!("Task: {}", instruction.trim())
}

pub fn dispatcher_system_prompt(catalog: &[FunctionSpec]) -> String {
    format!(
        "# Function Dispatch\n\n\
        You are the second stage of a two-stage agent. You receive one subtask \
        and choose the single function that performs it:\n\n\
        {}\n\n\
        ## Rules\n\
        - Use ONLY functions from the list above. Do not invent functions.\n\
        - Give every argument a literal value of the declared type.\n\
        - When the subtask consumes the result of an earlier subtask k, pass \
        {{\"$ref\": k}} for that argument instead of copying the value.\n\n\
        ## Response Format\n\
        Respond with JSON only:\n\
        {{\"function\": \"ai_list_files\", \"args\": {{\"path\": \"inbox\"}}}}",
        render_signatures(catalog)
    )
}

pub fn dispatcher_user_prompt(subtask: &Subtask, prior: Option<&Value>) -> String {
    let mut prompt = format!("Subtask {}: {}", subtask.index, subtask.description);
    if let Some(function) = &subtask.function {
        prompt.push_str(&format!("\nSuggested function: {function}"));
    }
    if let Some(k) = subtask.depends_on {
        prompt.push_str(&format!(
            "\nThis subtask consumes the result of subtask {k}; refer to it as {{\"$ref\": {k}}}."
        ));
        if let Some(value) = prior {
            prompt.push_str(&format!("\nResult of subtask {k}: {}", preview(value)));
        }
    }
    prompt
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= PREVIEW_LIMIT {
        return text;
    }
    let cut: String = text.chars().take(PREVIEW_LIMIT).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ParamSpec, ParamType};
    use serde_json::json;

    fn catalog() -> Vec<FunctionSpec> {
        vec![FunctionSpec::new("ai_list_files", "List files in a folder")
            .param(ParamSpec::required("path", ParamType::String))]
    }

    #[test]
    fn decomposer_prompt_lists_signatures_and_todo() {
        let prompt = decomposer_system_prompt(&catalog(), Some("- water plants"));
        assert!(prompt.contains("ai_list_files(path: string)"));
        assert!(prompt.contains("- water plants"));
        assert!(!decomposer_system_prompt(&catalog(), None).contains("Todo File"));
    }

    #[test]
    fn dispatcher_prompt_mentions_dependency() {
        let subtask = Subtask::new(2, "Categorize the files").depending_on(1);
        let prompt = dispatcher_user_prompt(&subtask, Some(&json!(["a.png"])));
        assert!(prompt.starts_with("Subtask 2: Categorize the files"));
        assert!(prompt.contains("{\"$ref\": 1}"));
        assert!(prompt.contains("[\"a.png\"]"));
    }

    #[test]
    fn dispatcher_example_names_a_builtin_function() {
        let registry = crate::functions::builtin_registry(".", "ai_");
        let prompt = dispatcher_system_prompt(registry.describe_all());
        let example = prompt
            .rsplit("{\"function\": \"")
            .next()
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert!(registry.contains(example), "{example} is not registered");
    }

    #[test]
    fn long_results_are_truncated() {
        let big = json!("x".repeat(2 * PREVIEW_LIMIT));
        assert!(preview(&big).ends_with("..."));
    }
}
