//! Script events and deferred trigger binding
//!
//! An `on <event>:` section is parsed while the script text is dispatched, but
//! its trigger is bound to the host only when the parser moves on to another
//! script. [`EventData`] buffers the parsed sections until then and performs
//! the binding as a single main-thread job.

use crate::context::ParserData;
use crate::host::Host;
use crate::items::TriggerItem;
use crate::pattern::ParseResult;
use crate::registry::EventInfo;
use crate::trigger::Trigger;
use parking_lot::Mutex;
use skript_core::{EventPriority, Script};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A host event class (`chat`, `interact` ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventClass(String);

impl EventClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event fired by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    pub class: EventClass,
    pub fields: HashMap<String, String>,
    pub cancelled: bool,
}

impl HostEvent {
    pub fn new(class: &str) -> Self {
        Self {
            class: EventClass::new(class),
            fields: HashMap::new(),
            cancelled: false,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Filter between a host event and a trigger body
pub trait SkriptEvent: Send + Sync + fmt::Debug {
    /// Take the match of the (stripped) event expression; `false` rejects it
    fn init(&mut self, result: &ParseResult) -> bool;

    /// Whether the trigger body should run for `event`
    fn check(&self, event: &HostEvent) -> bool;

    /// `false` skips parsing the body and binding a trigger
    fn should_load_event(&self) -> bool {
        true
    }

    /// Host event classes to listen to, overriding the registered ones
    fn event_classes(&self) -> Option<Vec<EventClass>> {
        None
    }

    fn is_event_priority_supported(&self) -> bool {
        true
    }

    fn as_self_registering(&self) -> Option<&dyn SelfRegistering> {
        None
    }

    fn describe(&self) -> String;
}

/// Events that bind their triggers themselves instead of through event classes
///
/// These never accept an event priority.
pub trait SelfRegistering: Send + Sync {
    fn register(&self, trigger: &Arc<Trigger>, host: &Host);

    fn unregister(&self, trigger: &Arc<Trigger>);

    /// Called once the event's section has been parsed
    fn after_parse(&self, _script: &Script) {}
}

/// Where an event structure finds the trigger bound for it
pub type TriggerSlot = Arc<Mutex<Option<Arc<Trigger>>>>;

/// An event section waiting to be bound
#[derive(Debug)]
pub struct ParsedEventData {
    pub info: EventInfo,
    pub skript_event: Arc<dyn SkriptEvent>,
    /// Event expression after `on` and the priority suffix were removed
    pub expr: String,
    pub line: usize,
    pub items: Vec<TriggerItem>,
    pub priority: Option<EventPriority>,
    pub slot: TriggerSlot,
}

/// Buffered event sections of the current script
#[derive(Debug, Default)]
pub struct EventData {
    events: Vec<ParsedEventData>,
}

impl EventData {
    pub fn push(&mut self, parsed: ParsedEventData) {
        self.events.push(parsed);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl ParserData for EventData {
    fn on_script_transition(&mut self, old: Option<&Arc<Script>>, _new: Option<&Arc<Script>>, host: &Arc<Host>) {
        if self.events.is_empty() {
            return;
        }

        let Some(script) = old.cloned() else {
            tracing::error!("Dropping {} event(s) parsed outside of a script", self.events.len());
            self.events.clear();
            return;
        };

        let events = std::mem::take(&mut self.events);
        tracing::debug!("Binding {} trigger(s) of {}", events.len(), script);

        let job_host = Arc::clone(host);
        host.main_thread.run_on_main(move || {
            for parsed in events {
                bind_trigger(&job_host, &script, parsed);
            }
        });
    }
}

fn bind_trigger(host: &Host, script: &Arc<Script>, parsed: ParsedEventData) {
    let ParsedEventData {
        info,
        skript_event,
        items,
        line,
        priority,
        slot,
        ..
    } = parsed;

    let trigger = Arc::new(Trigger::new(
        Arc::clone(script),
        info.name.clone(),
        Arc::clone(&skript_event),
        items,
        line,
    ));
    *slot.lock() = Some(Arc::clone(&trigger));

    match skript_event.as_self_registering() {
        Some(event) => {
            event.register(&trigger, host);
            host.events.add_self_registering_trigger(trigger);
        }
        None => {
            let classes = skript_event.event_classes().unwrap_or(info.event_classes);
            let priority = priority.unwrap_or(host.config.default_event_priority);
            host.events.add_trigger(&classes, priority, trigger);
        }
    }
}
