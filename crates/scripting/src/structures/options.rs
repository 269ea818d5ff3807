//! `options:` structure
//!
//! ```text
//! options:
//!     greeting: hi
//!     colors:
//!         main: red      # {@colors.main}
//! ```

use crate::context::{OptionsData, ParserContext};
use crate::error::{Result, ScriptError};
use crate::pattern::ParseResult;
use crate::structure::Structure;
use skript_config::{Node, SectionNode};
use skript_core::Priority;
use std::collections::BTreeMap;

pub struct OptionsStructure {
    entries: BTreeMap<String, String>,
}

impl OptionsStructure {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Flattened `a.b = value` entries
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    fn flatten(&mut self, ctx: &mut ParserContext, node: &SectionNode, prefix: &str) {
        for child in node {
            match child {
                Node::Entry(entry) => {
                    self.entries
                        .insert(format!("{}{}", prefix, entry.key), entry.value().to_string());
                }
                Node::Section(section) => {
                    let prefix = format!("{}{}.", prefix, section.key);
                    self.flatten(ctx, section, &prefix);
                }
                Node::Simple(simple) => ctx.report(ScriptError::config(
                    simple.line,
                    format!("Invalid line in options: '{}' is not a 'key: value' entry", simple.key),
                )),
            }
        }
    }

    /// Overlay the entries onto the parser's options; applying twice changes nothing
    fn apply(&self, ctx: &mut ParserContext) -> Result<()> {
        ctx.data::<OptionsData>()?.put_all(self.entries.iter());
        Ok(())
    }
}

impl Default for OptionsStructure {
    fn default() -> Self {
        Self::new()
    }
}

impl Structure for OptionsStructure {
    fn init(&mut self, ctx: &mut ParserContext, _result: &ParseResult, node: &SectionNode) -> Result<bool> {
        let entries = node.convert_to_entries(-1, ":");
        self.flatten(ctx, &entries, "");
        Ok(true)
    }

    fn preload(&mut self, ctx: &mut ParserContext) -> Result<()> {
        self.apply(ctx)
    }

    fn load(&mut self, ctx: &mut ParserContext) -> Result<()> {
        self.apply(ctx)
    }

    fn priority(&self) -> Priority {
        Priority::new(10)
    }

    fn describe(&self) -> String {
        "options".into()
    }
}
