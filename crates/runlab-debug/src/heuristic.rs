//! Static reconstruction of debugger states when no timeline exists.
//!
//! The scanner walks the source line by line without evaluating anything.
//! Every non-blank, non-comment line yields one [`DebugState`] carrying the
//! variables declared so far, with the text they were last assigned. The
//! call stack follows function bodies by brace depth. Loops and branches are
//! not simulated: the result reflects lexical order, not control flow.

use std::sync::LazyLock;

use regex::Regex;
use runlab_core::{DebugState, Variable};

/// Disclaimer shown alongside heuristic-mode states.
pub const HEURISTIC_NOTICE: &str = "Heuristic mode: no execution trace is available. \
     States follow the source line by line; loops and branches are not simulated \
     and values are shown as written, not evaluated.";

const SNIPPET_LIMIT: usize = 120;

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:let|const|var)\s+(.+)$").expect("declaration pattern")
});

static DECLARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*)\s*(?:=\s*(.*))?$").expect("declarator pattern")
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*)\s*(=|\+=|-=|\*=|/=|%=|\*\*=|\?\?=|\|\|=|&&=)\s*(.*)$")
        .expect("assignment pattern")
});

static UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\+\+|--)\s*([A-Za-z_$][\w$]*)|([A-Za-z_$][\w$]*)\s*(\+\+|--))\s*$")
        .expect("update pattern")
});

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+)?function\s+([A-Za-z_$][\w$]*)").expect("function pattern")
});

static FUNCTION_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:let|const|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>)",
    )
    .expect("function binding pattern")
});

/// Reconstructs one state per non-blank, non-comment line of `source`.
///
/// Deterministic: the same source always yields the same states.
pub fn reconstruct(source: &str) -> Vec<DebugState> {
    let mut scanner = Scanner::default();
    source
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| scanner.line(index as u32 + 1, raw))
        .collect()
}

#[derive(Default)]
struct Scanner {
    in_block_comment: bool,
    depth: usize,
    /// Open function bodies: name and the brace depth outside the body.
    functions: Vec<(String, usize)>,
    variables: Vec<Variable>,
}

impl Scanner {
    fn line(&mut self, number: u32, raw: &str) -> Option<DebugState> {
        let code = self.strip_comments(raw);
        let code = code.trim();
        if code.is_empty() {
            return None;
        }

        let call_stack = self.call_stack();
        for statement in split_top_level(code, ';') {
            self.record_bindings(statement.trim());
        }
        self.track_braces(code);

        Some(DebugState {
            line: number,
            variables: self.variables.clone(),
            call_stack,
            code_snippet: Some(raw.trim().chars().take(SNIPPET_LIMIT).collect()),
        })
    }

    fn call_stack(&self) -> Vec<String> {
        std::iter::once("<global>".to_string())
            .chain(self.functions.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    /// Removes `//` and `/* */` comments, carrying block-comment state across
    /// lines. String contents are left untouched.
    fn strip_comments(&mut self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();
        let mut quote: Option<char> = None;
        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if let Some(q) = quote {
                out.push(c);
                if c == '\\' {
                    out.extend(chars.next());
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match (c, chars.peek()) {
                ('/', Some('/')) => break,
                ('/', Some('*')) => {
                    chars.next();
                    self.in_block_comment = true;
                }
                ('"' | '\'' | '`', _) => {
                    quote = Some(c);
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        out
    }

    fn record_bindings(&mut self, statement: &str) {
        if let Some(caps) = DECLARATION.captures(statement) {
            for declarator in split_top_level(&caps[1], ',') {
                if let Some(parts) = DECLARATOR.captures(declarator.trim()) {
                    let text = parts.get(2).map(|m| m.as_str().trim());
                    self.bind(&parts[1], text);
                }
            }
            return;
        }
        if let Some(caps) = ASSIGNMENT.captures(statement) {
            let (name, op, rhs) = (&caps[1], &caps[2], caps[3].trim());
            // `a == b` matches the `=` operator with a right side starting at `=`.
            if op == "=" && rhs.starts_with('=') {
                return;
            }
            if self.is_declared(name) {
                if op == "=" {
                    self.bind(name, Some(rhs));
                } else {
                    self.bind(name, Some(statement));
                }
            }
            return;
        }
        if let Some(caps) = UPDATE.captures(statement) {
            let name = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            if let Some(name) = name.filter(|n| self.is_declared(n)) {
                let name = name.to_string();
                self.bind(&name, Some(statement));
            }
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v.name == name)
    }

    fn bind(&mut self, name: &str, text: Option<&str>) {
        let (value, type_tag) = describe_text(text);
        match self.variables.iter_mut().find(|v| v.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.type_tag = type_tag.to_string();
            }
            None => self.variables.push(Variable::new(name, value, type_tag)),
        }
    }

    fn track_braces(&mut self, code: &str) {
        let mut pending = FUNCTION_DECL
            .captures(code)
            .or_else(|| FUNCTION_BINDING.captures(code))
            .map(|caps| caps[1].to_string());
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for c in code.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => {
                    if let Some(name) = pending.take() {
                        self.functions.push((name, self.depth));
                    }
                    self.depth += 1;
                }
                '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    while self
                        .functions
                        .last()
                        .is_some_and(|(_, outer)| self.depth <= *outer)
                    {
                        self.functions.pop();
                    }
                }
                _ => {}
            }
        }
    }
}

/// Splits `text` at `separator` where it is not nested in brackets or quotes.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Guesses a snapshot value and type tag for an unevaluated initializer.
fn describe_text(text: Option<&str>) -> (serde_json::Value, &'static str) {
    use serde_json::Value as Json;

    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return (Json::Null, "undefined");
    };
    if text == "undefined" {
        return (Json::Null, "undefined");
    }
    if let Ok(json) = serde_json::from_str::<Json>(text) {
        let tag = match &json {
            Json::Null => "null",
            Json::Bool(_) => "boolean",
            Json::Number(_) => "number",
            Json::String(_) => "string",
            Json::Array(_) => "array",
            Json::Object(_) => "object",
        };
        return (json, tag);
    }
    let quoted = |q: char| text.len() >= 2 && text.starts_with(q) && text.ends_with(q);
    if quoted('\'') || quoted('`') {
        return (Json::String(text[1..text.len() - 1].to_string()), "string");
    }
    let tag = if text.starts_with('[') {
        "array"
    } else if text.starts_with('{') {
        "object"
    } else if text.starts_with("function") || text.starts_with("async") || text.contains("=>") {
        "function"
    } else if text.starts_with("new Promise") || text.starts_with("Promise.") {
        "promise"
    } else {
        "expression"
    };
    (Json::String(text.to_string()), tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(state: &DebugState) -> Vec<&str> {
        state.variables.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let states = reconstruct("// header\nlet a = 1;\n\n/* block\n still comment */\na = 2; // trailing\n");
        let lines: Vec<u32> = states.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![2, 6]);
        assert_eq!(states[1].variables[0].value, json!(2));
        assert_eq!(states[1].code_snippet.as_deref(), Some("a = 2; // trailing"));
    }

    #[test]
    fn tracks_declarations_textually() {
        let states = reconstruct("let a = 1, b = 'x';\nconst c = a + b;\nlet d;");
        assert_eq!(names(&states[0]), vec!["a", "b"]);
        assert_eq!(states[0].variables[1].value, json!("x"));
        assert_eq!(states[0].variables[1].type_tag, "string");
        assert_eq!(states[1].variables[2].value, json!("a + b"));
        assert_eq!(states[1].variables[2].type_tag, "expression");
        assert_eq!(states[2].variables[3].type_tag, "undefined");
    }

    #[test]
    fn comparisons_and_unknown_names_are_not_assignments() {
        let states = reconstruct("let a = 1;\na == 2;\nb = 3;\na++;");
        assert_eq!(states[1].variables[0].value, json!(1));
        assert_eq!(names(&states[2]), vec!["a"]);
        assert_eq!(states[3].variables[0].value, json!("a++"));
    }

    #[test]
    fn call_stack_follows_function_bodies() {
        let source = "function outer() {\n  const inner = (x) => {\n    return x;\n  };\n  return inner(1);\n}\nouter();";
        let states = reconstruct(source);
        let stacks: Vec<Vec<String>> = states.iter().map(|s| s.call_stack.clone()).collect();
        assert_eq!(stacks[0], vec!["<global>"]);
        assert_eq!(stacks[1], vec!["<global>", "outer"]);
        assert_eq!(stacks[2], vec!["<global>", "outer", "inner"]);
        assert_eq!(stacks[4], vec!["<global>", "outer"]);
        assert_eq!(stacks[6], vec!["<global>"]);
    }

    #[test]
    fn braces_in_strings_are_ignored() {
        let states = reconstruct("function f() {\n  const s = '}';\n  return s;\n}\nf();");
        assert_eq!(states[2].call_stack, vec!["<global>", "f"]);
        assert_eq!(states[4].call_stack, vec!["<global>"]);
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let source = "let total = 0;\nfor (let i = 0; i < 3; i++) {\n  total += i;\n}\nconsole.log(total);";
        assert_eq!(reconstruct(source), reconstruct(source));
    }
}
