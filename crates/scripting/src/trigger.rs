//! Bound triggers

use crate::error::Result;
use crate::event::{HostEvent, SkriptEvent};
use crate::host::Environment;
use crate::items::{run_items, TriggerItem};
use skript_core::Script;
use std::fmt;
use std::sync::Arc;

/// An event section bound to the host: its filter and its body
pub struct Trigger {
    script: Arc<Script>,
    event_name: String,
    event: Arc<dyn SkriptEvent>,
    items: Vec<TriggerItem>,
    line: usize,
    label: String,
}

impl Trigger {
    pub fn new(
        script: Arc<Script>,
        event_name: String,
        event: Arc<dyn SkriptEvent>,
        items: Vec<TriggerItem>,
        line: usize,
    ) -> Self {
        let label = format!("{}: line {}", script.name(), line);
        Self {
            script,
            event_name,
            event,
            items,
            line,
            label,
        }
    }

    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn event(&self) -> &Arc<dyn SkriptEvent> {
        &self.event
    }

    pub fn items(&self) -> &[TriggerItem] {
        &self.items
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// `file: line N`, used in logs
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the body if the event filter accepts `event`
    ///
    /// Returns whether the body ran.
    pub fn execute(&self, event: &mut HostEvent, env: &Environment) -> Result<bool> {
        if !self.event.check(event) {
            return Ok(false);
        }
        tracing::trace!("Running trigger {} ({})", self.label, self.event_name);
        run_items(&self.items, event, env, 0)?;
        Ok(true)
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("label", &self.label)
            .field("event", &self.event_name)
            .field("items", &self.items.len())
            .finish()
    }
}
