//! Built-in structures, events and parser sub-contexts

use crate::aliases::AliasesData;
use crate::commands::CommandData;
use crate::context::{DataRegistry, OptionsData, StructureData};
use crate::error::Result;
use crate::event::{EventData, HostEvent, SelfRegistering, SkriptEvent};
use crate::host::Host;
use crate::pattern::ParseResult;
use crate::registry::StructureRegistry;
use crate::structure::Structure;
use crate::structures::{
    AliasesStructure, CommandStructure, FunctionStructure, OptionsStructure, VariablesStructure,
};
use crate::trigger::Trigger;
use parking_lot::Mutex;
use skript_core::Script;
use std::sync::Arc;

/// Registry with every built-in structure and event
pub fn default_registry() -> Result<StructureRegistry> {
    let mut registry = StructureRegistry::new();
    register_structures(&mut registry)?;
    register_events(&mut registry)?;
    Ok(registry)
}

/// Built-in parser sub-contexts, in notification order
pub fn default_data() -> DataRegistry {
    let mut data = DataRegistry::new();
    data.register(StructureData::default);
    data.register(OptionsData::default);
    data.register(AliasesData::default);
    data.register(CommandData::default);
    data.register(EventData::default);
    data
}

/// Register the declarative structures
pub fn register_structures(registry: &mut StructureRegistry) -> Result<()> {
    registry.register_preloading_structure(
        "options",
        || Box::new(OptionsStructure::new()) as Box<dyn Structure>,
        10,
        &["options"],
    )?;
    registry.register_preloading_structure(
        "function",
        || Box::new(FunctionStructure::new()) as Box<dyn Structure>,
        20,
        &["function <.+>"],
    )?;
    registry.register_structure("aliases", || Box::new(AliasesStructure::new()), &["aliases"])?;
    registry.register_structure("variables", || Box::new(VariablesStructure::new()), &["variables"])?;
    registry.register_structure("command", || Box::new(CommandStructure::new()), &["command <.+>"])?;
    Ok(())
}

/// Register the built-in events
pub fn register_events(registry: &mut StructureRegistry) -> Result<()> {
    registry.register_event("chat", &["chat"], || Box::new(SimpleEvent::new("chat")), &["chat"])?;
    registry.register_event("join", &["join"], || Box::new(SimpleEvent::new("join")), &["[player] join[ing]"])?;
    registry.register_event(
        "click",
        &["interact"],
        || Box::new(ClickEvent::default()),
        &["[(1¦left|2¦right)[ ]]click[ing]"],
    )?;
    registry.register_event(
        "script load",
        &["script load"],
        || Box::new(ScriptLoadEvent::default()),
        &["[script] (load|enable)"],
    )?;
    Ok(())
}

/// Event without conditions
#[derive(Debug)]
pub struct SimpleEvent {
    name: &'static str,
}

impl SimpleEvent {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl SkriptEvent for SimpleEvent {
    fn init(&mut self, _result: &ParseResult) -> bool {
        true
    }

    fn check(&self, _event: &HostEvent) -> bool {
        true
    }

    fn describe(&self) -> String {
        self.name.to_string()
    }
}

/// Which button a click event listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickType {
    #[default]
    Any,
    Left,
    Right,
}

/// Left and right clicks share the host's `interact` event and are told apart by `check`
#[derive(Debug, Default)]
pub struct ClickEvent {
    click: ClickType,
}

impl SkriptEvent for ClickEvent {
    fn init(&mut self, result: &ParseResult) -> bool {
        self.click = match result.mark {
            1 => ClickType::Left,
            2 => ClickType::Right,
            _ => ClickType::Any,
        };
        true
    }

    fn check(&self, event: &HostEvent) -> bool {
        let action = event.field("action").unwrap_or_default();
        match self.click {
            ClickType::Any => true,
            ClickType::Left => action.eq_ignore_ascii_case("left"),
            ClickType::Right => action.eq_ignore_ascii_case("right"),
        }
    }

    fn describe(&self) -> String {
        match self.click {
            ClickType::Any => "click".into(),
            ClickType::Left => "left click".into(),
            ClickType::Right => "right click".into(),
        }
    }
}

/// Runs its trigger once, as soon as the trigger is bound
#[derive(Debug, Default)]
pub struct ScriptLoadEvent {
    triggers: Mutex<Vec<Arc<Trigger>>>,
}

impl ScriptLoadEvent {
    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().len()
    }
}

impl SkriptEvent for ScriptLoadEvent {
    fn init(&mut self, _result: &ParseResult) -> bool {
        true
    }

    fn check(&self, _event: &HostEvent) -> bool {
        true
    }

    fn is_event_priority_supported(&self) -> bool {
        false
    }

    fn as_self_registering(&self) -> Option<&dyn SelfRegistering> {
        Some(self)
    }

    fn describe(&self) -> String {
        "script load".into()
    }
}

impl SelfRegistering for ScriptLoadEvent {
    fn register(&self, trigger: &Arc<Trigger>, host: &Host) {
        self.triggers.lock().push(Arc::clone(trigger));

        let mut event = HostEvent::new("script load").with_field("script", trigger.script().name());
        if let Err(e) = trigger.execute(&mut event, &host.environment()) {
            tracing::error!("{} ({})", e, trigger.label());
        }
    }

    fn unregister(&self, trigger: &Arc<Trigger>) {
        self.triggers.lock().retain(|t| !Arc::ptr_eq(t, trigger));
    }

    fn after_parse(&self, script: &Script) {
        tracing::debug!("Parsed script load trigger of {}", script);
    }
}
