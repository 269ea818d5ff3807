//! Structure phase interface
//!
//! A structure is a top-level block of a script (`options:`, `on chat:`,
//! `function f():` ...). The loader drives every structure of a script through
//! its phases:
//!
//! 1. `init` while the script text is being dispatched (cheap, no cross-structure access)
//! 2. `preload` before any `load` of the script (declarations)
//! 3. `load` in ascending priority (binding)
//! 4. `after_load` in the same order (fix-ups)
//! 5. `settle` after the main thread has run what `load` queued
//! 6. `unload` at teardown in reverse priority, once per successful `load`

use crate::context::{ParserContext, ScriptInfo};
use crate::error::Result;
use crate::pattern::ParseResult;
use skript_config::SectionNode;
use skript_core::Priority;

/// Priority of structures that do not declare one
pub const DEFAULT_PRIORITY: Priority = Priority::new(1000);

/// A top-level script structure
pub trait Structure: Send {
    /// Validate the matched header and take what is needed from the section
    ///
    /// `Ok(false)` rejects the section and the loader reports it as not understood.
    fn init(&mut self, ctx: &mut ParserContext, result: &ParseResult, node: &SectionNode) -> Result<bool>;

    fn preload(&mut self, _ctx: &mut ParserContext) -> Result<()> {
        Ok(())
    }

    fn load(&mut self, _ctx: &mut ParserContext) -> Result<()> {
        Ok(())
    }

    fn after_load(&mut self, _ctx: &mut ParserContext) -> Result<()> {
        Ok(())
    }

    /// Check main-thread work queued by `load` once it has run
    ///
    /// An error marks the structure as not loaded, so `unload` skips it.
    fn settle(&mut self, _info: &mut ScriptInfo) -> Result<()> {
        Ok(())
    }

    /// Undo the side effects of `load`
    fn unload(&mut self, _ctx: &mut ParserContext) -> Result<()> {
        Ok(())
    }

    fn priority(&self) -> Priority {
        DEFAULT_PRIORITY
    }

    /// Short description for logs
    fn describe(&self) -> String;
}
