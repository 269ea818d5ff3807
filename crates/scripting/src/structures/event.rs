//! `on <event> [with priority <priority>]:` structure

use crate::context::{ParserContext, StructureData};
use crate::error::{Result, ScriptError};
use crate::event::{EventData, ParsedEventData, SkriptEvent, TriggerSlot};
use crate::items::load_items;
use crate::pattern::ParseResult;
use crate::structure::Structure;
use skript_config::SectionNode;
use skript_core::EventPriority;
use std::sync::Arc;

const PRIORITY_SEPARATOR: &str = " with priority ";

/// Wraps a [`SkriptEvent`]: strips `on` and the priority suffix, parses the
/// body and buffers it for binding when the script is done
pub struct EventStructure {
    pending: Option<Box<dyn SkriptEvent>>,
    event: Option<Arc<dyn SkriptEvent>>,
    priority: Option<EventPriority>,
    slot: TriggerSlot,
}

impl EventStructure {
    pub fn new(event: Box<dyn SkriptEvent>) -> Self {
        Self {
            pending: Some(event),
            event: None,
            priority: None,
            slot: TriggerSlot::default(),
        }
    }

    /// Priority given with `with priority`, if any
    pub fn event_priority(&self) -> Option<EventPriority> {
        self.priority
    }
}

/// Drop a leading `on ` (any case)
fn strip_on(expr: &str) -> &str {
    match expr.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("on ") => expr[3..].trim_start(),
        _ => expr,
    }
}

/// Split `expr with priority P` on the last separator
fn split_priority(expr: &str) -> Option<(&str, &str)> {
    // ASCII lowercasing keeps byte offsets valid for `expr`
    let at = expr.to_ascii_lowercase().rfind(PRIORITY_SEPARATOR)?;
    Some((expr[..at].trim_end(), expr[at + PRIORITY_SEPARATOR.len()..].trim()))
}

impl Structure for EventStructure {
    fn init(&mut self, ctx: &mut ParserContext, result: &ParseResult, node: &SectionNode) -> Result<bool> {
        let info = ctx
            .data::<StructureData>()?
            .info
            .clone()
            .ok_or_else(|| ScriptError::Fatal("Event structure initialised without a descriptor".into()))?;
        let event_info = info
            .event
            .clone()
            .ok_or_else(|| ScriptError::Fatal(format!("'{}' is not an event descriptor", info.id)))?;
        let mut pending = self
            .pending
            .take()
            .ok_or_else(|| ScriptError::Fatal("Event structure initialised twice".into()))?;

        let mut expr = strip_on(result.expr.trim());
        if let Some((rest, raw_priority)) = split_priority(expr) {
            if pending.as_self_registering().is_some() || !pending.is_event_priority_supported() {
                return Err(ScriptError::parse(node.line, "This event doesn't support event priority"));
            }
            let priority = raw_priority
                .parse::<EventPriority>()
                .map_err(|e| ScriptError::Fatal(e.to_string()))?;
            self.priority = Some(priority);
            expr = rest;
        }

        let stripped = ParseResult {
            expr: expr.to_string(),
            ..result.clone()
        };
        if !pending.init(&stripped) {
            return Ok(false);
        }

        let event: Arc<dyn SkriptEvent> = Arc::from(pending);
        self.event = Some(Arc::clone(&event));
        if !event.should_load_event() {
            return Ok(true);
        }

        let items = {
            let mut scope = ctx.enter_event(event_info.name.to_lowercase(), event_info.event_classes.clone());
            load_items(&mut scope, node)?
        };

        ctx.data::<EventData>()?.push(ParsedEventData {
            info: event_info,
            skript_event: Arc::clone(&event),
            expr: stripped.expr,
            line: node.line,
            items,
            priority: self.priority,
            slot: Arc::clone(&self.slot),
        });
        ctx.script_info_mut().triggers += 1;

        if let (Some(registering), Some(script)) = (event.as_self_registering(), ctx.current_script()) {
            registering.after_parse(script);
        }
        Ok(true)
    }

    fn unload(&mut self, ctx: &mut ParserContext) -> Result<()> {
        let slot = Arc::clone(&self.slot);
        let host = Arc::clone(ctx.host());
        ctx.host().main_thread.run_on_main(move || {
            let trigger = slot.lock().take();
            if let Some(trigger) = trigger {
                if let Some(registering) = trigger.event().as_self_registering() {
                    registering.unregister(&trigger);
                }
                host.events.remove_trigger(&trigger);
            }
        });
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.event {
            Some(event) => format!("on {}", event.describe()),
            None => "event".into(),
        }
    }
}
