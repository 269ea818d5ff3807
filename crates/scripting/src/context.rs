//! Parser context
//!
//! Per-parser state scoped to the script currently being loaded: the current
//! script pointer, typed sub-contexts (options, buffered events, aliases ...),
//! the current event stack used while parsing trigger bodies, script counters
//! and the diagnostic log.
//!
//! Moving the current script pointer notifies every constructed sub-context
//! *before* the pointer changes, which is where buffered work (notably event
//! triggers) gets bound to the host.

use crate::error::{ErrorKind, Result, ScriptError};
use crate::event::EventClass;
use crate::host::Host;
use crate::registry::StructureInfo;
use skript_config::SectionNode;
use skript_core::Script;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Downcasting support for sub-contexts
pub trait AsAny: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A typed sub-context of the parser
pub trait ParserData: AsAny + Send {
    /// Called when the current script moves from `old` to `new`, before the pointer changes
    fn on_script_transition(&mut self, _old: Option<&Arc<Script>>, _new: Option<&Arc<Script>>, _host: &Arc<Host>) {}
}

type DataFactory = Arc<dyn Fn() -> Box<dyn ParserData> + Send + Sync>;

/// Sub-context types built up front, in registration order
///
/// Types that are not registered are still built with `Default` the first time
/// they are requested.
#[derive(Default, Clone)]
pub struct DataRegistry {
    factories: Vec<(TypeId, DataFactory)>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sub-context type; registering a type twice keeps the first factory
    pub fn register<T: ParserData>(&mut self, factory: fn() -> T) {
        let id = TypeId::of::<T>();
        if self.factories.iter().any(|(existing, _)| *existing == id) {
            return;
        }
        self.factories
            .push((id, Arc::new(move || Box::new(factory()) as Box<dyn ParserData>)));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// The event a trigger body is being parsed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEvent {
    pub name: String,
    pub classes: Vec<EventClass>,
}

/// Counters for the script being loaded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptInfo {
    pub structures: usize,
    pub triggers: usize,
    pub functions: usize,
    pub commands: usize,
    /// Command names, used for tab completion
    pub command_names: Vec<String>,
}

/// A reported error
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub script: Option<String>,
    pub line: Option<usize>,
}

/// Options declared by the current script (`{@name}` substitutions)
#[derive(Debug, Default)]
pub struct OptionsData {
    options: HashMap<String, String>,
}

impl OptionsData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Overlay entries onto the current options
    pub fn put_all<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in entries {
            self.options.insert(key.clone(), value.clone());
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl ParserData for OptionsData {
    fn on_script_transition(&mut self, _old: Option<&Arc<Script>>, _new: Option<&Arc<Script>>, _host: &Arc<Host>) {
        self.options.clear();
    }
}

/// The section currently being dispatched and the descriptor it matched
#[derive(Debug, Default)]
pub struct StructureData {
    pub node: Option<SectionNode>,
    pub info: Option<Arc<StructureInfo>>,
}

impl ParserData for StructureData {
    fn on_script_transition(&mut self, _old: Option<&Arc<Script>>, _new: Option<&Arc<Script>>, _host: &Arc<Host>) {
        self.node = None;
        self.info = None;
    }
}

/// Parser state owned by one parser instance
pub struct ParserContext {
    host: Arc<Host>,
    current_script: Option<Arc<Script>>,
    data: Vec<(TypeId, Box<dyn ParserData>)>,
    events: Vec<CurrentEvent>,
    script_info: ScriptInfo,
    diagnostics: Vec<Diagnostic>,
}

impl ParserContext {
    /// Create a new context
    pub fn new(host: Arc<Host>) -> Self {
        Self::with_registry(host, &DataRegistry::new())
    }

    /// Create a context with the registered sub-contexts already built
    pub fn with_registry(host: Arc<Host>, registry: &DataRegistry) -> Self {
        let data = registry
            .factories
            .iter()
            .map(|(id, factory)| (*id, factory()))
            .collect();
        Self {
            host,
            current_script: None,
            data,
            events: Vec::new(),
            script_info: ScriptInfo::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn current_script(&self) -> Option<&Arc<Script>> {
        self.current_script.as_ref()
    }

    /// Move the current script pointer
    ///
    /// Same script is a no-op. Otherwise every sub-context observes the
    /// transition first, then the pointer and the script counters are reset.
    pub fn set_current_script(&mut self, script: Option<Arc<Script>>) {
        if self.current_script == script {
            return;
        }

        tracing::debug!(
            "Current script: {} -> {}",
            self.current_script.as_deref().map(Script::name).unwrap_or("none"),
            script.as_deref().map(Script::name).unwrap_or("none"),
        );

        let host = Arc::clone(&self.host);
        for (_, data) in self.data.iter_mut() {
            data.on_script_transition(self.current_script.as_ref(), script.as_ref(), &host);
        }

        self.current_script = script;
        self.script_info = ScriptInfo::default();
    }

    /// Sub-context of type `T`, built once on first access
    pub fn data<T: ParserData + Default>(&mut self) -> Result<&mut T> {
        let id = TypeId::of::<T>();
        if !self.data.iter().any(|(existing, _)| *existing == id) {
            self.data.push((id, Box::new(T::default())));
        }
        self.data
            .iter_mut()
            .find_map(|(_, data)| AsAny::as_any_mut(data.as_mut()).downcast_mut::<T>())
            .ok_or_else(|| ScriptError::Fatal(format!("Sub-context {} is unavailable", std::any::type_name::<T>())))
    }

    /// Sub-context of type `T` if it was already built
    pub fn data_ref<T: ParserData>(&self) -> Option<&T> {
        let id = TypeId::of::<T>();
        self.data
            .iter()
            .find(|(existing, _)| *existing == id)
            .and_then(|(_, data)| AsAny::as_any(data.as_ref()).downcast_ref::<T>())
    }

    /// Push a current event; pair with [`delete_current_event`](Self::delete_current_event)
    pub fn set_current_event(&mut self, name: impl Into<String>, classes: Vec<EventClass>) {
        self.events.push(CurrentEvent {
            name: name.into(),
            classes,
        });
    }

    /// Pop the innermost current event
    pub fn delete_current_event(&mut self) {
        self.events.pop();
    }

    /// Push a current event that is popped when the returned guard drops
    pub fn enter_event(&mut self, name: impl Into<String>, classes: Vec<EventClass>) -> EventScope<'_> {
        let depth = self.events.len();
        self.set_current_event(name, classes);
        EventScope { ctx: self, depth }
    }

    pub fn current_event(&self) -> Option<&CurrentEvent> {
        self.events.last()
    }

    pub fn is_current_event(&self, name: &str) -> bool {
        self.current_event().map(|e| e.name.eq_ignore_ascii_case(name)).unwrap_or(false)
    }

    pub fn script_info(&self) -> &ScriptInfo {
        &self.script_info
    }

    pub fn script_info_mut(&mut self) -> &mut ScriptInfo {
        &mut self.script_info
    }

    /// Replace every `{@name}` with the value of option `name`
    pub fn replace_options(&self, text: &str, line: usize) -> Result<String> {
        if !text.contains("{@") {
            return Ok(text.to_string());
        }

        let options = self.data_ref::<OptionsData>();
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("{@") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| ScriptError::parse(line, "Unclosed option reference '{@'"))?;
            let key = &after[..end];
            match options.and_then(|o| o.get(key)) {
                Some(value) => out.push_str(value),
                None => return Err(ScriptError::parse(line, format!("Undefined option {{@{}}}", key))),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Record an error and log it
    pub fn report(&mut self, error: ScriptError) {
        let line = error.line();
        self.record(error, line);
    }

    /// Report an error raised while handling the node at `line`
    pub fn report_at(&mut self, error: ScriptError, line: usize) {
        let error = error.at_line(line);
        let line = error.line().or((line > 0).then_some(line));
        self.record(error, line);
    }

    fn record(&mut self, error: ScriptError, line: Option<usize>) {
        let script = self.current_script.as_ref().map(|s| s.name().to_string());
        match (&script, line) {
            (Some(script), Some(line)) => tracing::error!("{} ({}, line {})", error, script, line),
            (Some(script), None) => tracing::error!("{} ({})", error, script),
            _ => tracing::error!("{}", error),
        }
        self.diagnostics.push(Diagnostic {
            kind: error.kind(),
            message: error.message(),
            script,
            line,
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Current event frame, popped on drop
pub struct EventScope<'a> {
    ctx: &'a mut ParserContext,
    depth: usize,
}

impl Deref for EventScope<'_> {
    type Target = ParserContext;

    fn deref(&self) -> &ParserContext {
        &*self.ctx
    }
}

impl DerefMut for EventScope<'_> {
    fn deref_mut(&mut self) -> &mut ParserContext {
        &mut *self.ctx
    }
}

impl Drop for EventScope<'_> {
    fn drop(&mut self) {
        self.ctx.events.truncate(self.depth);
    }
}
