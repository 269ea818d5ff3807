//! Trigger bodies
//!
//! Body lines are kept mostly as text: the host's effect sink interprets them
//! at run time. Only the parts the loader must bind are recognised here:
//! function calls (checked against the registered signatures), `return`, and
//! the event cancellation effect.

use crate::context::ParserContext;
use crate::error::{Result, ScriptError};
use crate::event::HostEvent;
use crate::host::Environment;
use regex::Regex;
use skript_config::{Node, SectionNode};
use std::sync::OnceLock;

/// One executable line of a trigger body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerItem {
    Effect { text: String, line: usize },
    FunctionCall { name: String, args: Vec<String>, line: usize },
    Return { value: Option<String>, line: usize },
    /// A nested block, run when the sink accepts its header
    Section { header: String, line: usize, items: Vec<TriggerItem> },
}

impl TriggerItem {
    pub fn line(&self) -> usize {
        match self {
            TriggerItem::Effect { line, .. }
            | TriggerItem::FunctionCall { line, .. }
            | TriggerItem::Return { line, .. }
            | TriggerItem::Section { line, .. } => *line,
        }
    }
}

/// How a body finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Return(Option<String>),
}

fn call_regex() -> Option<&'static Regex> {
    static CALL: OnceLock<Option<Regex>> = OnceLock::new();
    CALL.get_or_init(|| Regex::new(r"^([A-Za-z_]\w*)\((.*)\)$").ok()).as_ref()
}

/// Parse the body of a section
///
/// Lines that fail to parse are reported and skipped. When any line refers to
/// an undeclared function the whole body is rejected with a bind error.
pub fn load_items(ctx: &mut ParserContext, node: &SectionNode) -> Result<Vec<TriggerItem>> {
    let mut unresolved = 0;
    let items = load_section(ctx, node, &mut unresolved);
    if unresolved > 0 {
        return Err(ScriptError::bind(
            node.line,
            format!("{} unresolved reference(s) in '{}'", unresolved, node.key),
        ));
    }
    Ok(items)
}

fn load_section(ctx: &mut ParserContext, node: &SectionNode, unresolved: &mut usize) -> Vec<TriggerItem> {
    let mut items = Vec::new();
    for child in node {
        let (text, line) = match child {
            Node::Simple(simple) => (simple.key.clone(), simple.line),
            Node::Entry(entry) => (format!("{}: {}", entry.key, entry.value), entry.line),
            Node::Section(section) => {
                match ctx.replace_options(&section.key, section.line) {
                    Ok(header) => {
                        let children = load_section(ctx, section, unresolved);
                        items.push(TriggerItem::Section {
                            header,
                            line: section.line,
                            items: children,
                        });
                    }
                    Err(e) => ctx.report(e),
                }
                continue;
            }
        };

        match parse_line(ctx, &text, line) {
            Ok(item) => items.push(item),
            Err(e @ ScriptError::Bind { .. }) => {
                *unresolved += 1;
                ctx.report(e);
            }
            Err(e) => ctx.report(e),
        }
    }
    items
}

fn parse_line(ctx: &ParserContext, text: &str, line: usize) -> Result<TriggerItem> {
    let text = ctx.replace_options(text, line)?;
    let text = text.trim();

    let lower = text.to_lowercase();
    if lower == "return" || lower.starts_with("return ") {
        if !ctx.is_current_event("function") {
            return Err(ScriptError::parse(line, "'return' can only be used in a function"));
        }
        let value = text.get(6..).unwrap_or("").trim();
        return Ok(TriggerItem::Return {
            value: (!value.is_empty()).then(|| value.to_string()),
            line,
        });
    }

    if let Some(caps) = call_regex().and_then(|r| r.captures(text)) {
        let name = caps[1].to_string();
        let args = split_args(&caps[2]);
        let signature = ctx
            .host()
            .functions
            .signature(&name)
            .ok_or_else(|| ScriptError::bind(line, format!("The function '{}' does not exist", name)))?;
        if !signature.accepts(args.len()) {
            return Err(ScriptError::bind(
                line,
                format!(
                    "The function '{}' takes {} argument(s), {} given",
                    name,
                    signature.parameters.len(),
                    args.len()
                ),
            ));
        }
        return Ok(TriggerItem::FunctionCall { name, args, line });
    }

    Ok(TriggerItem::Effect {
        text: text.to_string(),
        line,
    })
}

/// Split call arguments on top-level commas
fn split_args(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for c in raw.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Replace `{_name}` with the event's local field `_name`
fn expand_locals(text: &str, event: &HostEvent) -> String {
    if !text.contains("{_") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{_") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match event.field(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + end + 2]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Run a body against an event
pub fn run_items(items: &[TriggerItem], event: &mut HostEvent, env: &Environment, depth: usize) -> Result<Flow> {
    for item in items {
        match item {
            TriggerItem::Effect { text, .. } => {
                let text = expand_locals(text, event);
                if text.eq_ignore_ascii_case("cancel event") {
                    event.cancelled = true;
                } else if text.eq_ignore_ascii_case("uncancel event") {
                    event.cancelled = false;
                } else {
                    env.effects.run_effect(&text, event);
                }
            }
            TriggerItem::FunctionCall { name, args, .. } => {
                let args = args.iter().map(|a| expand_locals(a, event)).collect();
                env.functions.call(name, args, env, depth)?;
            }
            TriggerItem::Return { value, .. } => {
                return Ok(Flow::Return(value.as_ref().map(|v| expand_locals(v, event))));
            }
            TriggerItem::Section { header, items, .. } => {
                let header = expand_locals(header, event);
                if env.effects.run_effect(&header, event) {
                    if let Flow::Return(value) = run_items(items, event, env, depth)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
        }
    }
    Ok(Flow::Continue)
}
