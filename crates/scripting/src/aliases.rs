//! Per-script alias tables
//!
//! An `aliases:` section maps names to item lists (`tools = pickaxe, axe`). An
//! item written as `{name}` expands to a previously declared alias.

use crate::context::ParserData;
use crate::error::ScriptError;
use crate::host::Host;
use skript_config::{Node, SectionNode};
use skript_core::Script;
use std::collections::HashMap;
use std::sync::Arc;

/// Aliases declared by one script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptAliases {
    aliases: HashMap<String, Vec<String>>,
}

impl ScriptAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the `name = item, item` entries of a section
    ///
    /// Bad lines are skipped and returned as errors.
    pub fn load(&mut self, node: &SectionNode) -> Vec<ScriptError> {
        let mut errors = Vec::new();
        for child in node {
            let Node::Entry(entry) = child else {
                errors.push(ScriptError::config(child.line(), "Invalid line in aliases section"));
                continue;
            };

            let name = entry.key.trim().to_lowercase();
            let mut items = Vec::new();
            for item in entry.value().split(',').map(str::trim).filter(|i| !i.is_empty()) {
                match item.strip_prefix('{').and_then(|i| i.strip_suffix('}')) {
                    Some(reference) => match self.aliases.get(&reference.trim().to_lowercase()) {
                        Some(expanded) => items.extend(expanded.iter().cloned()),
                        None => errors.push(ScriptError::config(
                            entry.line,
                            format!("'{}' is not an alias", reference),
                        )),
                    },
                    None => items.push(item.to_lowercase()),
                }
            }

            if items.is_empty() {
                errors.push(ScriptError::config(entry.line, format!("Alias '{}' has no items", name)));
                continue;
            }
            self.aliases.insert(name, items);
        }
        errors
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.aliases.get(&name.trim().to_lowercase()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// The alias table of the current script
#[derive(Debug, Default)]
pub struct AliasesData {
    table: Option<ScriptAliases>,
}

impl AliasesData {
    /// The current table, created on first use
    pub fn table_mut(&mut self) -> &mut ScriptAliases {
        self.table.get_or_insert_with(ScriptAliases::new)
    }

    pub fn table(&self) -> Option<&ScriptAliases> {
        self.table.as_ref()
    }
}

impl ParserData for AliasesData {
    fn on_script_transition(&mut self, _old: Option<&Arc<Script>>, _new: Option<&Arc<Script>>, _host: &Arc<Host>) {
        self.table = None;
    }
}
