//! Structure pattern matching
//!
//! Patterns are written in the script DSL's syntax notation and compiled to
//! case-insensitive anchored regular expressions:
//!
//! - literal words match themselves, whitespace matches any run of whitespace
//! - `[x]` makes `x` optional, `(a|b)` picks one alternative
//! - `1¦left` inside a choice contributes `1` to the match mark when taken
//!   (marks of all taken alternatives are XOR-combined)
//! - `<regex>` captures raw text, recorded in [`ParseResult::regexes`]
//! - `%type%` captures a typed argument, recorded in [`ParseResult::args`]

use crate::error::{Result, ScriptError};
use regex::Regex;

/// A typed argument captured by a `%type%` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub type_name: String,
    pub text: String,
}

/// Outcome of matching a line against a pattern
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseResult {
    /// The matched text, trimmed
    pub expr: String,
    /// Index of the pattern that matched within its descriptor
    pub matched_pattern: usize,
    /// Typed arguments in pattern order, `None` when inside an untaken optional
    pub args: Vec<Option<Literal>>,
    /// Raw `<regex>` captures in pattern order
    pub regexes: Vec<String>,
    pub mark: i32,
}

impl ParseResult {
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
enum Capture {
    Argument { group: String, type_name: String },
    Regex { group: String },
    Mark { group: String, mark: i32 },
}

/// A compiled pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    captures: Vec<Capture>,
}

impl Pattern {
    /// Compile a pattern
    pub fn compile(source: &str) -> Result<Self> {
        let mut compiler = Compiler {
            chars: source.chars().collect(),
            pos: 0,
            captures: Vec::new(),
            source,
        };
        let body = compiler.sequence(&[])?;
        if let Some(c) = compiler.peek() {
            return Err(compiler.error(&format!("unexpected '{}'", c)));
        }

        let regex = Regex::new(&format!("(?i)^{}$", body))
            .map_err(|e| ScriptError::Fatal(format!("Invalid pattern '{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            regex,
            captures: compiler.captures,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match a whole expression against this pattern
    pub fn match_expr(&self, expr: &str) -> Option<ParseResult> {
        let expr = expr.trim();
        let caps = self.regex.captures(expr)?;

        let mut result = ParseResult::new(expr);
        for capture in &self.captures {
            match capture {
                Capture::Argument { group, type_name } => {
                    result.args.push(caps.name(group).map(|m| Literal {
                        type_name: type_name.clone(),
                        text: m.as_str().trim().to_string(),
                    }));
                }
                Capture::Regex { group } => {
                    if let Some(m) = caps.name(group) {
                        result.regexes.push(m.as_str().to_string());
                    }
                }
                Capture::Mark { group, mark } => {
                    if caps.name(group).is_some() {
                        result.mark ^= mark;
                    }
                }
            }
        }
        Some(result)
    }
}

struct Compiler<'a> {
    chars: Vec<char>,
    pos: usize,
    captures: Vec<Capture>,
    source: &'a str,
}

impl Compiler<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::Fatal(format!("Invalid pattern '{}' at {}: {}", self.source, self.pos, message))
    }

    fn group_name(&self, prefix: char) -> String {
        format!("{}{}", prefix, self.captures.len())
    }

    /// Compile until one of `stop` (left unconsumed) or the end of the pattern
    fn sequence(&mut self, stop: &[char]) -> Result<String> {
        let mut out = String::new();

        while let Some(c) = self.peek() {
            if stop.contains(&c) {
                break;
            }
            match c {
                '[' => {
                    self.pos += 1;
                    let inner = self.choice(']')?;
                    if self.peek() == Some(' ') {
                        while self.peek() == Some(' ') {
                            self.pos += 1;
                        }
                        out.push_str(&format!("(?:{}\\s+)?", inner));
                    } else {
                        out.push_str(&format!("(?:{})?", inner));
                    }
                }
                '(' => {
                    self.pos += 1;
                    out.push_str(&self.choice(')')?);
                }
                '<' => {
                    self.pos += 1;
                    let raw = self.take_until('>')?;
                    let group = self.group_name('r');
                    out.push_str(&format!("(?P<{}>{})", group, raw));
                    self.captures.push(Capture::Regex { group });
                }
                '%' => {
                    self.pos += 1;
                    let raw = self.take_until('%')?;
                    let type_name = raw.trim_start_matches(['-', '*', '~']).trim().to_string();
                    if type_name.is_empty() {
                        return Err(self.error("empty type placeholder"));
                    }
                    let group = self.group_name('a');
                    out.push_str(&format!("(?P<{}>.+?)", group));
                    self.captures.push(Capture::Argument { group, type_name });
                }
                '\\' => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
                ' ' => {
                    while self.peek() == Some(' ') {
                        self.pos += 1;
                    }
                    out.push_str("\\s+");
                }
                ']' | ')' | '|' => return Err(self.error(&format!("unbalanced '{}'", c))),
                other => {
                    self.pos += 1;
                    out.push_str(&regex::escape(&other.to_string()));
                }
            }
        }

        Ok(out)
    }

    /// Alternatives separated by `|` up to and including `close`
    fn choice(&mut self, close: char) -> Result<String> {
        let mut alternatives = Vec::new();
        loop {
            let mark = self.mark_prefix();
            let inner = self.sequence(&['|', close])?;
            match mark {
                Some(mark) => {
                    let group = self.group_name('m');
                    alternatives.push(format!("(?P<{}>{})", group, inner));
                    self.captures.push(Capture::Mark { group, mark });
                }
                None => alternatives.push(inner),
            }

            match self.peek() {
                Some('|') => self.pos += 1,
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error(&format!("missing '{}'", close))),
            }
        }
        Ok(format!("(?:{})", alternatives.join("|")))
    }

    /// `N¦` at the start of an alternative
    fn mark_prefix(&mut self) -> Option<i32> {
        let start = self.pos;
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            digits.push(c);
            self.pos += 1;
        }
        if !digits.is_empty() && self.peek() == Some('¦') {
            self.pos += 1;
            return digits.parse().ok();
        }
        self.pos = start;
        None
    }

    fn take_until(&mut self, end: char) -> Result<String> {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == end {
                return Ok(raw);
            }
            raw.push(c);
        }
        Err(self.error(&format!("missing '{}'", end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match_is_case_insensitive() {
        let pattern = Pattern::compile("options").unwrap();
        assert!(pattern.match_expr("Options").is_some());
        assert!(pattern.match_expr("optionsx").is_none());
    }

    #[test]
    fn test_regex_capture() {
        let pattern = Pattern::compile("function <.+>").unwrap();
        let result = pattern.match_expr("function a()").unwrap();
        assert_eq!(result.regexes, vec!["a()".to_string()]);
        assert!(pattern.match_expr("functional x").is_none());
    }

    #[test]
    fn test_optional_prefix_and_suffix() {
        let pattern = Pattern::compile("[on] chat[ with priority <.+>]").unwrap();
        assert!(pattern.match_expr("chat").is_some());
        assert!(pattern.match_expr("on chat").is_some());
        let result = pattern.match_expr("on chat with priority HIGHEST").unwrap();
        assert_eq!(result.regexes, vec!["HIGHEST".to_string()]);
        assert!(pattern.match_expr("onchat").is_none());
    }

    #[test]
    fn test_marks() {
        let pattern = Pattern::compile("[(1¦left|2¦right) ]click").unwrap();
        assert_eq!(pattern.match_expr("left click").unwrap().mark, 1);
        assert_eq!(pattern.match_expr("right click").unwrap().mark, 2);
        assert_eq!(pattern.match_expr("click").unwrap().mark, 0);
    }

    #[test]
    fn test_typed_arguments() {
        let pattern = Pattern::compile("damage of %entity%[ by %-number%]").unwrap();
        let result = pattern.match_expr("damage of zombie").unwrap();
        assert_eq!(result.args.len(), 2);
        assert_eq!(result.args[0].as_ref().unwrap().text, "zombie");
        assert_eq!(result.args[0].as_ref().unwrap().type_name, "entity");
        assert!(result.args[1].is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Pattern::compile("(a|b").is_err());
        assert!(Pattern::compile("a]").is_err());
        assert!(Pattern::compile("<.+").is_err());
    }
}
