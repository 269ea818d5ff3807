//! `variables:` structure
//!
//! Seeds default values into the variable store. Names may contain `%type%`
//! placeholders, stored as `<codename>` segments that match any value of that
//! shape:
//!
//! ```text
//! variables:
//!     {score::%player%} = 0
//! ```

use crate::classes::ClassRegistry;
use crate::context::ParserContext;
use crate::error::{Result, ScriptError};
use crate::pattern::ParseResult;
use crate::structure::Structure;
use skript_config::{Node, SectionNode};
use skript_core::Priority;

#[derive(Default)]
pub struct VariablesStructure {
    seeded: Vec<String>,
}

impl VariablesStructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names written to the store by this structure
    pub fn seeded(&self) -> &[String] {
        &self.seeded
    }

    fn seed(&mut self, ctx: &ParserContext, key: &str, value: &str, line: usize) -> Result<()> {
        let host = ctx.host();
        let name = default_variable_name(&host.classes, key, line)?;

        if host.variables.get_variable(&name).is_some() {
            tracing::debug!("Variable {{{}}} already exists, keeping it", name);
            return Ok(());
        }

        let parsed = host
            .classes
            .parse_simple(value)
            .ok_or_else(|| ScriptError::parse(line, format!("Can't understand the value '{}'", value)))?;
        let class = host
            .classes
            .super_class_info(&parsed)
            .ok_or_else(|| ScriptError::Fatal(format!("No class info for '{}'", parsed.class_name())))?;
        if !class.is_serializable() {
            return Err(ScriptError::config(line, format!("Can't save '{}' in a variable", value)));
        }
        let stored = match class.serialized_as() {
            Some(target) => host
                .classes
                .convert(&parsed, target)
                .ok_or_else(|| ScriptError::config(line, format!("Can't save '{}' in a variable", value)))?,
            None => parsed,
        };

        host.variables.set_variable(&name, Some(stored));
        self.seeded.push(name);
        Ok(())
    }
}

/// Normalise a default variable name, replacing `%type%` with `<codename>`
fn default_variable_name(classes: &ClassRegistry, raw: &str, line: usize) -> Result<String> {
    let lowered = raw.trim().to_lowercase();
    let name = lowered
        .strip_prefix('{')
        .and_then(|n| n.strip_suffix('}'))
        .unwrap_or(&lowered);

    let invalid = || ScriptError::config(line, format!("'{}' is not a valid name for a default variable", name));

    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(start) = rest.find('%') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            break;
        };
        let input = &after[..end];
        if input.is_empty() || input.contains(['{', '}']) {
            return Err(invalid());
        }
        let class = classes
            .class_info_from_user_input(input)
            .ok_or_else(|| ScriptError::config(line, format!("Can't understand the type '{}'", input)))?;
        out.push_str(&rest[..start]);
        out.push('<');
        out.push_str(class.code_name());
        out.push('>');
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    if out.contains('%') {
        return Err(ScriptError::config(line, "Invalid use of percent signs in variable name"));
    }
    if out.contains(['{', '}']) {
        return Err(invalid());
    }
    Ok(out)
}

impl Structure for VariablesStructure {
    fn init(&mut self, ctx: &mut ParserContext, _result: &ParseResult, node: &SectionNode) -> Result<bool> {
        let entries = node.convert_to_entries(0, "=");
        for child in &entries {
            let result = match child {
                Node::Entry(entry) => self.seed(ctx, &entry.key, entry.value(), entry.line),
                other => Err(ScriptError::config(other.line(), "Invalid line in variables section")),
            };
            if let Err(e) = result {
                ctx.report(e);
            }
        }
        Ok(true)
    }

    fn priority(&self) -> Priority {
        Priority::new(20)
    }

    fn describe(&self) -> String {
        "variables".into()
    }
}
