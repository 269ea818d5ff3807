//! `function name(params) :: type:` structure

use crate::context::ParserContext;
use crate::error::{Result, ScriptError};
use crate::event::EventClass;
use crate::functions::{parse_signature, Function, Signature};
use crate::items::load_items;
use crate::pattern::ParseResult;
use crate::structure::Structure;
use skript_config::SectionNode;
use skript_core::Priority;
use std::sync::Arc;

#[derive(Default)]
pub struct FunctionStructure {
    header: String,
    node: Option<SectionNode>,
    signature: Option<Arc<Signature>>,
}

impl FunctionStructure {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Structure for FunctionStructure {
    fn init(&mut self, _ctx: &mut ParserContext, result: &ParseResult, node: &SectionNode) -> Result<bool> {
        self.header = result
            .regexes
            .first()
            .cloned()
            .ok_or_else(|| ScriptError::Fatal(format!("No signature given in '{}'", result.expr)))?;
        self.node = Some(node.clone());
        Ok(true)
    }

    /// Declare the signature so bodies loaded later can call this function
    fn preload(&mut self, ctx: &mut ParserContext) -> Result<()> {
        let line = self.node.as_ref().map(|n| n.line).unwrap_or_default();
        let script = ctx
            .current_script()
            .cloned()
            .ok_or_else(|| ScriptError::Fatal("Function preloaded outside of a script".into()))?;
        let host = ctx.host();
        let signature = parse_signature(&host.classes, &script, &self.header, line)?;
        self.signature = Some(host.functions.register_signature(signature)?);
        Ok(())
    }

    fn load(&mut self, ctx: &mut ParserContext) -> Result<()> {
        let node = self
            .node
            .as_ref()
            .ok_or_else(|| ScriptError::Fatal("Function loaded before init".into()))?;
        let signature = self.signature.as_ref().ok_or_else(|| {
            ScriptError::bind(node.line, format!("The signature of '{}' was not registered", self.header))
        })?;

        let items = {
            let mut scope = ctx.enter_event("function", vec![EventClass::new("function")]);
            load_items(&mut scope, node)?
        };
        ctx.host()
            .functions
            .register_function(Function::new(Signature::clone(signature), items))?;
        ctx.script_info_mut().functions += 1;
        Ok(())
    }

    fn unload(&mut self, ctx: &mut ParserContext) -> Result<()> {
        if let Some(signature) = self.signature.take() {
            ctx.host().functions.unregister(&signature);
        }
        Ok(())
    }

    fn priority(&self) -> Priority {
        Priority::new(30)
    }

    fn describe(&self) -> String {
        format!("function {}", self.header)
    }
}
