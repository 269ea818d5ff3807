//! `command /name:` structure

use crate::commands::{load_command, CommandData, ScriptCommand};
use crate::context::{ParserContext, ScriptInfo};
use crate::error::{Result, ScriptError};
use crate::event::EventClass;
use crate::pattern::ParseResult;
use crate::structure::Structure;
use parking_lot::Mutex;
use skript_config::SectionNode;
use skript_core::Priority;
use std::sync::Arc;

/// Outcome of the main-thread registration
#[derive(Debug, Default)]
struct Registration {
    registered: Option<Arc<ScriptCommand>>,
    failure: Option<String>,
}

#[derive(Default)]
pub struct CommandStructure {
    usage_line: String,
    node: Option<SectionNode>,
    name: Option<String>,
    registration: Arc<Mutex<Registration>>,
}

impl CommandStructure {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Structure for CommandStructure {
    fn init(&mut self, _ctx: &mut ParserContext, result: &ParseResult, node: &SectionNode) -> Result<bool> {
        self.usage_line = result
            .regexes
            .first()
            .cloned()
            .ok_or_else(|| ScriptError::Fatal(format!("No command given in '{}'", result.expr)))?;
        self.node = Some(node.clone());
        Ok(true)
    }

    fn load(&mut self, ctx: &mut ParserContext) -> Result<()> {
        let node = self
            .node
            .as_ref()
            .ok_or_else(|| ScriptError::Fatal("Command loaded before init".into()))?;

        let command = {
            let mut scope = ctx.enter_event("command", vec![EventClass::new("command")]);
            load_command(&mut scope, &self.usage_line, node)?
        };

        if ctx.data::<CommandData>()?.contains(&command.name) {
            return Err(ScriptError::parse(
                node.line,
                format!("The command /{} is already defined in this script", command.name),
            ));
        }

        let name = command.name.clone();
        let command = Arc::new(command);
        let registration = Arc::clone(&self.registration);
        let commands = Arc::clone(&ctx.host().commands);
        ctx.host().main_thread.run_on_main(move || {
            let result = commands.register_command(Arc::clone(&command));
            let mut registration = registration.lock();
            match result {
                Ok(()) => registration.registered = Some(command),
                Err(e) => {
                    tracing::error!("{}", e);
                    registration.failure = Some(e.message());
                }
            }
        });

        // Only an inline registration can have failed by now
        if let Some(message) = self.registration.lock().failure.take() {
            return Err(ScriptError::Host(message));
        }

        ctx.data::<CommandData>()?.declare(&name);
        let info = ctx.script_info_mut();
        info.command_names.push(name.clone());
        info.commands += 1;
        self.name = Some(name);
        Ok(())
    }

    /// A queued registration that the host rejected un-counts the command
    fn settle(&mut self, info: &mut ScriptInfo) -> Result<()> {
        let Some(message) = self.registration.lock().failure.take() else {
            return Ok(());
        };
        if let Some(name) = &self.name {
            info.command_names.retain(|n| n != name);
            info.commands = info.commands.saturating_sub(1);
        }
        Err(ScriptError::Host(message))
    }

    fn unload(&mut self, ctx: &mut ParserContext) -> Result<()> {
        let registration = Arc::clone(&self.registration);
        let commands = Arc::clone(&ctx.host().commands);
        ctx.host().main_thread.run_on_main(move || {
            let registered = registration.lock().registered.take();
            if let Some(command) = registered {
                commands.unregister_command(&command.name);
            }
        });
        Ok(())
    }

    fn priority(&self) -> Priority {
        Priority::new(10)
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("command /{}", name),
            None => "command".into(),
        }
    }
}
