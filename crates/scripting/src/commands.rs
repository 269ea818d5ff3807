//! Script commands
//!
//! ```text
//! command /give <player> [<number>]:
//!     aliases: /g
//!     permission: server.give
//!     executable by: players and console
//!     trigger:
//!         send "given"
//! ```

use crate::context::{ParserContext, ParserData};
use crate::error::{Result, ScriptError};
use crate::host::Host;
use crate::items::{load_items, TriggerItem};
use skript_config::{Node, SectionNode};
use skript_core::Script;
use std::sync::Arc;

/// Who may run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutableBy {
    Players,
    Console,
    #[default]
    Both,
}

impl ExecutableBy {
    fn parse(value: &str) -> Option<Self> {
        let mut players = false;
        let mut console = false;
        for part in value.to_lowercase().replace(" and ", ",").split(',') {
            match part.trim() {
                "players" | "player" => players = true,
                "console" => console = true,
                _ => return None,
            }
        }
        match (players, console) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Players),
            (false, true) => Some(Self::Console),
            (false, false) => None,
        }
    }
}

/// A parsed `command` structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    pub name: String,
    /// Raw argument syntax after the name
    pub arguments: String,
    pub aliases: Vec<String>,
    pub usage: String,
    pub description: String,
    pub permission: Option<String>,
    pub permission_message: Option<String>,
    pub executable_by: ExecutableBy,
    pub items: Vec<TriggerItem>,
    pub script: Arc<Script>,
    pub line: usize,
}

impl ScriptCommand {
    /// Name followed by aliases
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Commands declared by the current script
#[derive(Debug, Default)]
pub struct CommandData {
    names: Vec<String>,
}

impl CommandData {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Record a command name the script has registered
    pub fn declare(&mut self, name: &str) {
        if !self.contains(name) {
            self.names.push(name.to_string());
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl ParserData for CommandData {
    fn on_script_transition(&mut self, _old: Option<&Arc<Script>>, _new: Option<&Arc<Script>>, _host: &Arc<Host>) {
        self.names.clear();
    }
}

fn label(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_lowercase()
}

/// Check the `<type>` placeholders of the argument syntax
fn check_arguments(ctx: &ParserContext, arguments: &str, line: usize) -> Result<()> {
    let mut rest = arguments;
    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let end = after
            .find('>')
            .ok_or_else(|| ScriptError::parse(line, "Unclosed '<' in command arguments"))?;
        let inner = &after[..end];
        let type_name = inner.split('=').next().unwrap_or(inner).trim();
        if ctx.host().classes.class_info_from_user_input(type_name).is_none() {
            return Err(ScriptError::parse(line, format!("Cannot recognise the type '{}'", type_name)));
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

/// Parse a command section
///
/// `usage_line` is the header text after `command`. Unknown entries are reported and
/// skipped; a missing `trigger` section fails the command.
pub fn load_command(ctx: &mut ParserContext, usage_line: &str, node: &SectionNode) -> Result<ScriptCommand> {
    let script = ctx
        .current_script()
        .cloned()
        .ok_or_else(|| ScriptError::Fatal("Command parsed outside of a script".into()))?;

    let usage_line = usage_line.trim();
    let (name, arguments) = match usage_line.split_once(char::is_whitespace) {
        Some((name, arguments)) => (label(name), arguments.trim().to_string()),
        None => (label(usage_line), String::new()),
    };
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ScriptError::parse(node.line, format!("Invalid command name '{}'", usage_line)));
    }
    check_arguments(ctx, &arguments, node.line)?;

    let mut command = ScriptCommand {
        usage: format!("/{} {}", name, arguments).trim_end().to_string(),
        name,
        arguments,
        aliases: Vec::new(),
        description: String::new(),
        permission: None,
        permission_message: None,
        executable_by: ExecutableBy::default(),
        items: Vec::new(),
        script,
        line: node.line,
    };

    let entries = node.convert_to_entries(0, ":");
    let mut trigger = None;
    for child in &entries {
        match child {
            Node::Section(section) if section.key.eq_ignore_ascii_case("trigger") => trigger = Some(section),
            Node::Entry(entry) => {
                let value = entry.value().to_string();
                match entry.key.to_lowercase().as_str() {
                    "usage" => command.usage = value,
                    "description" => command.description = value,
                    "permission" => command.permission = Some(value),
                    "permission message" => command.permission_message = Some(value),
                    "aliases" => {
                        command.aliases = value
                            .split(',')
                            .map(label)
                            .filter(|a| !a.is_empty() && *a != command.name)
                            .collect();
                    }
                    "executable by" => match ExecutableBy::parse(&value) {
                        Some(by) => command.executable_by = by,
                        None => ctx.report(ScriptError::config(
                            entry.line,
                            format!("'{}' is not a valid value for 'executable by'", value),
                        )),
                    },
                    other => ctx.report(ScriptError::config(
                        entry.line,
                        format!("Unexpected entry '{}' in command /{}", other, command.name),
                    )),
                }
            }
            other => ctx.report(ScriptError::config(
                other.line(),
                format!("Unexpected line '{}' in command /{}", other.key(), command.name),
            )),
        }
    }

    let trigger = trigger.ok_or_else(|| {
        ScriptError::config(node.line, format!("Required entry 'trigger' is missing in command /{}", command.name))
    })?;
    command.items = load_items(ctx, trigger)?;
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use skript_config::SkriptConfig;
    use skript_core::LoadGeneration;

    fn setup() -> (InMemoryHost, ParserContext) {
        let host = InMemoryHost::new(SkriptConfig::default());
        let mut ctx = ParserContext::new(host.host.clone());
        ctx.set_current_script(Some(Arc::new(Script::new("cmd.sk", LoadGeneration(1)))));
        (host, ctx)
    }

    fn section(source: &str) -> SectionNode {
        let root = SectionNode::parse("cmd.sk", source).unwrap();
        let Node::Section(section) = &root.nodes()[0] else { panic!() };
        section.clone()
    }

    #[test]
    fn test_load_command_entries() {
        let (_host, mut ctx) = setup();
        let node = section(
            "command /give <player> [<number>]:\n  aliases: /g, gv\n  permission: server.give\n  executable by: players\n  cooldown: 2 seconds\n  trigger:\n    send \"given\"\n",
        );

        let command = load_command(&mut ctx, "/give <player> [<number>]", &node).unwrap();
        assert_eq!(command.name, "give");
        assert_eq!(command.arguments, "<player> [<number>]");
        assert_eq!(command.aliases, vec!["g".to_string(), "gv".to_string()]);
        assert_eq!(command.permission.as_deref(), Some("server.give"));
        assert_eq!(command.executable_by, ExecutableBy::Players);
        assert_eq!(command.usage, "/give <player> [<number>]");
        assert_eq!(command.items.len(), 1);
        assert_eq!(command.labels().count(), 3);

        // the unknown 'cooldown' entry
        assert_eq!(ctx.diagnostics().len(), 1);
    }

    #[test]
    fn test_missing_trigger() {
        let (_host, mut ctx) = setup();
        let node = section("command /ping:\n  usage: /ping\n");
        let err = load_command(&mut ctx, "/ping", &node).unwrap_err();
        assert!(matches!(err, ScriptError::Config { line: 1, .. }));
    }

    #[test]
    fn test_unknown_argument_type() {
        let (_host, mut ctx) = setup();
        let node = section("command /fly <spaceship>:\n  trigger:\n    send \"x\"\n");
        assert!(load_command(&mut ctx, "/fly <spaceship>", &node).is_err());
    }

    #[test]
    fn test_executable_by() {
        assert_eq!(ExecutableBy::parse("players and console"), Some(ExecutableBy::Both));
        assert_eq!(ExecutableBy::parse("console"), Some(ExecutableBy::Console));
        assert_eq!(ExecutableBy::parse("everyone"), None);
    }
}
