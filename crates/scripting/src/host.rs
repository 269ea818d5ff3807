//! Host services
//!
//! The loader binds scripts against a [`Host`]: an event bus, a command table,
//! a variable store, the function and class registries, an effect sink and the
//! main thread handle. The in-memory implementations here back the host binary
//! and the tests.

use crate::classes::ClassRegistry;
use crate::commands::ScriptCommand;
use crate::error::{Result, ScriptError};
use crate::event::{EventClass, HostEvent};
use crate::functions::FunctionRegistry;
use crate::items::run_items;
use crate::scheduler::MainThread;
use crate::trigger::Trigger;
use crate::variables::{InMemoryVariableStore, VariableStore};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use skript_config::SkriptConfig;
use skript_core::EventPriority;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Event subscriptions, owned by the main thread
pub trait EventBus: Send + Sync {
    fn add_trigger(&self, classes: &[EventClass], priority: EventPriority, trigger: Arc<Trigger>);

    fn add_self_registering_trigger(&self, trigger: Arc<Trigger>);

    /// Remove every subscription of `trigger`
    fn remove_trigger(&self, trigger: &Arc<Trigger>);
}

/// Command table, owned by the main thread
pub trait CommandRegistry: Send + Sync {
    fn register_command(&self, command: Arc<ScriptCommand>) -> Result<()>;

    fn unregister_command(&self, name: &str) -> bool;
}

/// Interprets effect lines of trigger bodies
pub trait EffectSink: Send + Sync {
    /// Run one effect; for a section header the result decides whether its body runs
    fn run_effect(&self, effect: &str, event: &mut HostEvent) -> bool;
}

/// Everything a running trigger needs
#[derive(Clone)]
pub struct Environment {
    pub functions: Arc<FunctionRegistry>,
    pub effects: Arc<dyn EffectSink>,
    pub max_call_depth: usize,
}

/// Services the loader binds scripts against
pub struct Host {
    pub events: Arc<dyn EventBus>,
    pub commands: Arc<dyn CommandRegistry>,
    pub variables: Arc<dyn VariableStore>,
    pub functions: Arc<FunctionRegistry>,
    pub classes: Arc<ClassRegistry>,
    pub effects: Arc<dyn EffectSink>,
    pub main_thread: MainThread,
    pub config: SkriptConfig,
}

impl Host {
    pub fn environment(&self) -> Environment {
        Environment {
            functions: Arc::clone(&self.functions),
            effects: Arc::clone(&self.effects),
            max_call_depth: self.config.max_call_depth,
        }
    }
}

#[derive(Clone)]
struct Subscription {
    class: EventClass,
    priority: EventPriority,
    sequence: u64,
    trigger: Arc<Trigger>,
}

/// In-memory event bus
pub struct InMemoryEventBus {
    main_thread: MainThread,
    subscriptions: RwLock<Vec<Subscription>>,
    self_registering: RwLock<Vec<Arc<Trigger>>>,
    sequence: AtomicU64,
    off_main: AtomicUsize,
}

impl InMemoryEventBus {
    pub fn new(main_thread: MainThread) -> Self {
        Self {
            main_thread,
            subscriptions: RwLock::new(Vec::new()),
            self_registering: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
            off_main: AtomicUsize::new(0),
        }
    }

    fn track_thread(&self) {
        if !self.main_thread.is_main_thread() {
            self.off_main.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("Event subscriptions modified off the main thread");
        }
    }

    /// Fire an event at every matching trigger, lowest priority first
    ///
    /// Returns the number of trigger bodies that ran. Failing triggers are
    /// logged and do not stop the others.
    pub fn fire(&self, event: &mut HostEvent, env: &Environment) -> usize {
        let triggers: Vec<Arc<Trigger>> = self
            .triggers_for(&event.class)
            .into_iter()
            .map(|(_, trigger)| trigger)
            .collect();

        let mut ran = 0;
        for trigger in triggers {
            match trigger.execute(event, env) {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("{} ({})", e, trigger.label()),
            }
        }
        ran
    }

    /// Subscriptions of a class in dispatch order
    pub fn triggers_for(&self, class: &EventClass) -> Vec<(EventPriority, Arc<Trigger>)> {
        let mut matching: Vec<Subscription> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| &s.class == class)
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.priority, s.sequence));
        matching.into_iter().map(|s| (s.priority, s.trigger)).collect()
    }

    /// `(class, priority, trigger label)` of every subscription, sorted
    pub fn snapshot(&self) -> Vec<(EventClass, EventPriority, String)> {
        let mut entries: Vec<_> = self
            .subscriptions
            .read()
            .iter()
            .map(|s| (s.class.clone(), s.priority, s.trigger.label().to_string()))
            .collect();
        entries.extend(
            self.self_registering
                .read()
                .iter()
                .map(|t| (EventClass::new(t.event_name()), EventPriority::Normal, t.label().to_string())),
        );
        entries.sort();
        entries
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn self_registering_count(&self) -> usize {
        self.self_registering.read().len()
    }

    /// Mutations made off the main thread
    pub fn off_main_mutations(&self) -> usize {
        self.off_main.load(Ordering::SeqCst)
    }
}

impl EventBus for InMemoryEventBus {
    fn add_trigger(&self, classes: &[EventClass], priority: EventPriority, trigger: Arc<Trigger>) {
        self.track_thread();
        let mut subscriptions = self.subscriptions.write();
        for class in classes {
            tracing::debug!("Trigger {} listens to {} at {}", trigger.label(), class, priority);
            subscriptions.push(Subscription {
                class: class.clone(),
                priority,
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                trigger: Arc::clone(&trigger),
            });
        }
    }

    fn add_self_registering_trigger(&self, trigger: Arc<Trigger>) {
        self.track_thread();
        self.self_registering.write().push(trigger);
    }

    fn remove_trigger(&self, trigger: &Arc<Trigger>) {
        self.track_thread();
        self.subscriptions.write().retain(|s| !Arc::ptr_eq(&s.trigger, trigger));
        self.self_registering.write().retain(|t| !Arc::ptr_eq(t, trigger));
    }
}

/// In-memory command table
pub struct InMemoryCommandTable {
    main_thread: MainThread,
    commands: DashMap<String, Arc<ScriptCommand>>,
    labels: DashMap<String, String>,
    off_main: AtomicUsize,
}

impl InMemoryCommandTable {
    pub fn new(main_thread: MainThread) -> Self {
        Self {
            main_thread,
            commands: DashMap::new(),
            labels: DashMap::new(),
            off_main: AtomicUsize::new(0),
        }
    }

    fn track_thread(&self) {
        if !self.main_thread.is_main_thread() {
            self.off_main.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("Command table modified off the main thread");
        }
    }

    /// Whether a name or alias is registered
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(&label.trim_start_matches('/').to_lowercase())
    }

    pub fn get(&self, label: &str) -> Option<Arc<ScriptCommand>> {
        let label = label.trim_start_matches('/').to_lowercase();
        let name = self.labels.get(&label)?.clone();
        self.commands.get(&name).map(|c| Arc::clone(&c))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered command names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    pub fn off_main_mutations(&self) -> usize {
        self.off_main.load(Ordering::SeqCst)
    }

    /// Run a command by name or alias; `false` when no such command exists
    pub fn dispatch(&self, label: &str, arguments: &str, env: &Environment) -> Result<bool> {
        let Some(command) = self.get(label) else {
            return Ok(false);
        };
        let mut event = HostEvent::new("command")
            .with_field("command", command.name.as_str())
            .with_field("arguments", arguments);
        run_items(&command.items, &mut event, env, 0)?;
        Ok(true)
    }
}

impl CommandRegistry for InMemoryCommandTable {
    fn register_command(&self, command: Arc<ScriptCommand>) -> Result<()> {
        self.track_thread();
        if let Some(taken) = command.labels().find(|label| self.labels.contains_key(*label)) {
            return Err(ScriptError::Host(format!(
                "A command or alias named '/{}' is already registered",
                taken
            )));
        }
        for label in command.labels() {
            self.labels.insert(label.to_string(), command.name.clone());
        }
        tracing::debug!("Registered command /{}", command.name);
        self.commands.insert(command.name.clone(), command);
        Ok(())
    }

    fn unregister_command(&self, name: &str) -> bool {
        self.track_thread();
        match self.commands.remove(name) {
            Some((_, command)) => {
                for label in command.labels() {
                    self.labels.remove(label);
                }
                tracing::debug!("Unregistered command /{}", name);
                true
            }
            None => false,
        }
    }
}

/// Effect sink that records every effect and accepts every section header
#[derive(Debug, Default)]
pub struct RecordingEffects {
    effects: Mutex<Vec<String>>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<String> {
        self.effects.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.effects.lock())
    }
}

impl EffectSink for RecordingEffects {
    fn run_effect(&self, effect: &str, _event: &mut HostEvent) -> bool {
        tracing::trace!("Effect: {}", effect);
        self.effects.lock().push(effect.to_string());
        true
    }
}

/// A [`Host`] built from the in-memory services, with typed handles to each
pub struct InMemoryHost {
    pub host: Arc<Host>,
    pub events: Arc<InMemoryEventBus>,
    pub commands: Arc<InMemoryCommandTable>,
    pub variables: Arc<InMemoryVariableStore>,
    pub effects: Arc<RecordingEffects>,
}

impl InMemoryHost {
    /// Create a host whose main thread is the calling thread
    pub fn new(config: SkriptConfig) -> Self {
        Self::with_main_thread(config, MainThread::new())
    }

    pub fn with_main_thread(config: SkriptConfig, main_thread: MainThread) -> Self {
        let events = Arc::new(InMemoryEventBus::new(main_thread.clone()));
        let commands = Arc::new(InMemoryCommandTable::new(main_thread.clone()));
        let variables = Arc::new(InMemoryVariableStore::new());
        let effects = Arc::new(RecordingEffects::new());

        let host = Arc::new(Host {
            events: events.clone(),
            commands: commands.clone(),
            variables: variables.clone(),
            functions: Arc::new(FunctionRegistry::new()),
            classes: Arc::new(ClassRegistry::with_defaults()),
            effects: effects.clone(),
            main_thread,
            config,
        });

        Self {
            host,
            events,
            commands,
            variables,
            effects,
        }
    }

    pub fn environment(&self) -> Environment {
        self.host.environment()
    }

    /// Fire an event on the in-memory bus
    pub fn fire(&self, event: &mut HostEvent) -> usize {
        self.events.fire(event, &self.environment())
    }
}
