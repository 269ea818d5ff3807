//! `aliases:` structure

use crate::aliases::AliasesData;
use crate::context::ParserContext;
use crate::error::Result;
use crate::pattern::ParseResult;
use crate::structure::Structure;
use skript_config::SectionNode;

#[derive(Default)]
pub struct AliasesStructure {
    loaded: usize,
}

impl AliasesStructure {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Structure for AliasesStructure {
    fn init(&mut self, ctx: &mut ParserContext, _result: &ParseResult, node: &SectionNode) -> Result<bool> {
        let entries = node.convert_to_entries(0, "=");
        let table = ctx.data::<AliasesData>()?.table_mut();
        let before = table.len();
        let errors = table.load(&entries);
        self.loaded = table.len() - before;

        for error in errors {
            ctx.report(error);
        }
        tracing::debug!("Loaded {} script alias(es)", self.loaded);
        Ok(true)
    }

    fn describe(&self) -> String {
        "aliases".into()
    }
}
