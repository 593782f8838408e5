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

use crate::llm::json::strip_code_fence;
use serde_json::{Map, Value};

/// A call expression such as `ai_list_files('inbox', recursive=True)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub function: String,
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

/// Parses the call-expression form some models answer with instead of JSON.
/// Literals follow the usual scripting conventions: quoted strings, numbers,
/// `True`/`False`/`None` (or their JSON spellings), `[...]` lists, `(...)`
/// tuples and `{...}` maps. A bare identifier is taken as its own name.
pub fn parse_call(text: &str) -> Result<ParsedCall, String> {
    let text = strip_code_fence(text.trim()).trim();
    let text = text.strip_suffix(';').unwrap_or(text).trim_end();
    let mut parser = Parser::new(text);

    let qualified = parser
        .identifier()
        .ok_or_else(|| "expected a function name".to_string())?;
    let function = qualified
        .rsplit('.')
        .next()
        .unwrap_or(qualified.as_str())
        .to_string();

    parser.skip_ws();
    parser.expect('(')?;
    let (positional, keyword) = parser.arguments()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(format!("unexpected text after call: '{}'", parser.rest()));
    }
    Ok(ParsedCall {
        function,
        positional,
        keyword,
    })
}

/// Nesting limit for lists and maps, the same as serde_json's.
const MAX_DEPTH: usize = 128;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn rest(&self) -> String {
        self.chars[self.pos.min(self.chars.len())..].iter().collect()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), String> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(format!("expected '{wanted}', found '{c}'")),
            None => Err(format!("expected '{wanted}', found end of input")),
        }
    }

    fn identifier(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return None,
        }
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            self.pos += 1;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn arguments(&mut self) -> Result<(Vec<Value>, Vec<(String, Value)>), String> {
        let mut positional = Vec::new();
        let mut keyword: Vec<(String, Value)> = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(')') {
                self.pos += 1;
                return Ok((positional, keyword));
            }

            let checkpoint = self.pos;
            let name = match self.identifier() {
                Some(name) => {
                    self.skip_ws();
                    let assigns =
                        self.peek() == Some('=') && self.chars.get(self.pos + 1) != Some(&'=');
                    assigns.then_some(name)
                }
                None => None,
            };
            match name {
                Some(name) => {
                    self.pos += 1;
                    let value = self.value()?;
                    if keyword.iter().any(|(k, _)| *k == name) {
                        return Err(format!("argument '{name}' given twice"));
                    }
                    keyword.push((name, value));
                }
                None => {
                    self.pos = checkpoint;
                    if !keyword.is_empty() {
                        return Err("positional argument follows keyword argument".to_string());
                    }
                    positional.push(self.value()?);
                }
            }

            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(')') => return Ok((positional, keyword)),
                Some(c) => return Err(format!("expected ',' or ')', found '{c}'")),
                None => return Err("unterminated argument list".to_string()),
            }
        }
    }

    fn value(&mut self) -> Result<Value, String> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                self.string(quote).map(Value::String)
            }
            Some('[') => self.nested(|p| p.sequence(']').map(Value::Array)),
            Some('(') => self.nested(|p| p.sequence(')').map(Value::Array)),
            Some('{') => self.nested(|p| p.mapping().map(Value::Object)),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(_) => {
                let word = self
                    .identifier()
                    .ok_or_else(|| format!("unexpected input '{}'", self.rest()))?;
                Ok(match word.as_str() {
                    "True" | "true" => Value::Bool(true),
                    "False" | "false" => Value::Bool(false),
                    "None" | "null" => Value::Null,
                    _ => Value::String(word),
                })
            }
            None => Err("expected a value, found end of input".to_string()),
        }
    }

    /// Consumes an opening delimiter and parses its contents one level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, String>,
    ) -> Result<T, String> {
        if self.depth >= MAX_DEPTH {
            return Err("nesting too deep".to_string());
        }
        self.pos += 1;
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn string(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string literal".to_string()),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return Err("unterminated string literal".to_string()),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::from(i));
        }
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number '{text}'"))
    }

    fn sequence(&mut self, close: char) -> Result<Vec<Value>, String> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(c) if c == close => return Ok(items),
                Some(c) => return Err(format!("expected ',' or '{close}', found '{c}'")),
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn mapping(&mut self) -> Result<Map<String, Value>, String> {
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(map);
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(map),
                Some(c) => return Err(format!("expected ',' or '}}', found '{c}'")),
                None => return Err("unterminated mapping".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_call_with_mixed_literals() {
        let call =
            parse_call("ai_get_file_list(path='un_organized', recursive=True, depth=2)").unwrap();
        assert_eq!(call.function, "ai_get_file_list");
        assert!(call.positional.is_empty());
        assert_eq!(
            call.keyword,
            vec![
                ("path".to_string(), json!("un_organized")),
                ("recursive".to_string(), json!(true)),
                ("depth".to_string(), json!(2)),
            ]
        );
    }

    #[test]
    fn positional_arguments_and_fences() {
        let call = parse_call("```python\nai_add_two_numbers(2, 3.5)\n```").unwrap();
        assert_eq!(call.function, "ai_add_two_numbers");
        assert_eq!(call.positional, vec![json!(2), json!(3.5)]);
    }

    #[test]
    fn nested_collections() {
        let call = parse_call(concat!(
            r#"ai_move_files(base_path="inbox", "#,
            r#"categories={'images': ['a.png', "b.jpg"]}, skip=None)"#
        ))
        .unwrap();
        assert_eq!(call.keyword[1].1, json!({"images": ["a.png", "b.jpg"]}));
        assert_eq!(call.keyword[2].1, Value::Null);
    }

    #[test]
    fn bare_identifiers_and_module_paths() {
        let call =
            parse_call("functions.ai_create_folders(unique_file_types=unique_file_types)").unwrap();
        assert_eq!(call.function, "ai_create_folders");
        assert_eq!(call.keyword[0].1, json!("unique_file_types"));
    }

    #[test]
    fn malformed_calls_are_rejected() {
        assert!(parse_call("I would call the list function").is_err());
        assert!(parse_call("ai_x(path='a'").is_err());
        assert!(parse_call("ai_x(path='a', 3)").is_err());
        assert!(parse_call("ai_x(a=1, a=2)").is_err());
        assert!(parse_call("ai_x() and then more").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let deep = format!("ai_list_files(path={}1{})", "[".repeat(2000), "]".repeat(2000));
        assert_eq!(parse_call(&deep).unwrap_err(), "nesting too deep");

        let mapped = format!("ai_x(a={}{})", "{'k': ".repeat(500), "}".repeat(500));
        assert_eq!(parse_call(&mapped).unwrap_err(), "nesting too deep");

        let shallow = format!("ai_x(a={}1{})", "[".repeat(100), "]".repeat(100));
        assert!(parse_call(&shallow).is_ok());
    }

    #[test]
    fn escaped_quotes_survive() {
        let call = parse_call(r"ai_read_file(path='it\'s.txt')").unwrap();
        assert_eq!(call.keyword[0].1, json!("it's.txt"));
    }
}
