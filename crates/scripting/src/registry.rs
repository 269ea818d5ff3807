//! Structure registry
//!
//! Holds the descriptors every script section is matched against: preloading
//! structures (sorted by their order key, matched first) and normal structures
//! (in registration order). Earlier descriptors win ties.

use crate::error::Result;
use crate::event::{EventClass, SkriptEvent};
use crate::pattern::{ParseResult, Pattern};
use crate::structure::Structure;
use crate::structures::EventStructure;
use std::fmt;
use std::sync::Arc;

/// Creates a fresh structure instance for a matched section
pub type StructureFactory = Arc<dyn Fn() -> Box<dyn Structure> + Send + Sync>;

/// Creates a fresh event instance for a matched `on ...` section
pub type SkriptEventFactory = Arc<dyn Fn() -> Box<dyn SkriptEvent> + Send + Sync>;

/// Suffix appended to every event pattern
const EVENT_PRIORITY_SYNTAX: &str = "[ with priority <.+>]";

/// Descriptor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    Normal,
    Preloading { order: i32 },
}

/// Extra descriptor data carried by event structures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    /// Event name, used as the parser's current event while the body is parsed
    pub name: String,
    /// Host event classes triggers are registered against
    pub event_classes: Vec<EventClass>,
}

/// A registered structure descriptor
pub struct StructureInfo {
    pub id: String,
    pub kind: StructureKind,
    patterns: Vec<Pattern>,
    factory: StructureFactory,
    pub event: Option<EventInfo>,
}

impl StructureInfo {
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Create a new structure instance
    pub fn create(&self) -> Box<dyn Structure> {
        (self.factory)()
    }

    /// Try each pattern in order, first match wins
    pub fn match_expr(&self, expr: &str) -> Option<ParseResult> {
        self.patterns.iter().enumerate().find_map(|(index, pattern)| {
            pattern.match_expr(expr).map(|mut result| {
                result.matched_pattern = index;
                result
            })
        })
    }
}

impl fmt::Debug for StructureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureInfo")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("patterns", &self.patterns.iter().map(Pattern::source).collect::<Vec<_>>())
            .field("event", &self.event)
            .finish()
    }
}

/// A committed match of a section header
#[derive(Debug, Clone)]
pub struct StructureMatch {
    pub info: Arc<StructureInfo>,
    pub result: ParseResult,
}

/// Match `expr` against descriptors in iterator order
pub fn match_structure<'a, I>(expr: &str, infos: I) -> Option<StructureMatch>
where
    I: IntoIterator<Item = &'a Arc<StructureInfo>>,
{
    infos.into_iter().find_map(|info| {
        info.match_expr(expr).map(|result| StructureMatch {
            info: Arc::clone(info),
            result,
        })
    })
}

/// Registry of structure descriptors
#[derive(Debug, Default)]
pub struct StructureRegistry {
    preloading: Vec<Arc<StructureInfo>>,
    normal: Vec<Arc<StructureInfo>>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, id: &str) -> bool {
        self.preloading.iter().chain(self.normal.iter()).any(|info| info.id == id)
    }

    fn compile(patterns: &[&str]) -> Result<Vec<Pattern>> {
        patterns.iter().map(|p| Pattern::compile(p)).collect()
    }

    /// Register a normal structure, appended after existing ones
    pub fn register_structure<F>(&mut self, id: &str, factory: F, patterns: &[&str]) -> Result<()>
    where
        F: Fn() -> Box<dyn Structure> + Send + Sync + 'static,
    {
        if self.contains(id) {
            tracing::debug!("Structure '{}' already registered", id);
            return Ok(());
        }
        self.normal.push(Arc::new(StructureInfo {
            id: id.to_string(),
            kind: StructureKind::Normal,
            patterns: Self::compile(patterns)?,
            factory: Arc::new(factory),
            event: None,
        }));
        Ok(())
    }

    /// Register a preloading structure, kept sorted by `order` (stable)
    pub fn register_preloading_structure<F>(&mut self, id: &str, factory: F, order: i32, patterns: &[&str]) -> Result<()>
    where
        F: Fn() -> Box<dyn Structure> + Send + Sync + 'static,
    {
        if self.contains(id) {
            tracing::debug!("Structure '{}' already registered", id);
            return Ok(());
        }
        let info = Arc::new(StructureInfo {
            id: id.to_string(),
            kind: StructureKind::Preloading { order },
            patterns: Self::compile(patterns)?,
            factory: Arc::new(factory),
            event: None,
        });
        let position = self
            .preloading
            .iter()
            .position(|existing| matches!(existing.kind, StructureKind::Preloading { order: o } if o > order))
            .unwrap_or(self.preloading.len());
        self.preloading.insert(position, info);
        Ok(())
    }

    /// Register an event as a normal structure
    ///
    /// Every pattern accepts an optional leading `on` and a trailing
    /// `with priority <priority>`.
    pub fn register_event<F>(&mut self, name: &str, event_classes: &[&str], factory: F, patterns: &[&str]) -> Result<()>
    where
        F: Fn() -> Box<dyn SkriptEvent> + Send + Sync + 'static,
    {
        let id = format!("event:{}", name.to_lowercase());
        if self.contains(&id) {
            tracing::debug!("Event '{}' already registered", name);
            return Ok(());
        }

        let expanded: Vec<String> = patterns
            .iter()
            .map(|p| format!("[on] {}{}", p, EVENT_PRIORITY_SYNTAX))
            .collect();
        let expanded: Vec<&str> = expanded.iter().map(String::as_str).collect();

        let events: SkriptEventFactory = Arc::new(factory);
        self.normal.push(Arc::new(StructureInfo {
            id,
            kind: StructureKind::Normal,
            patterns: Self::compile(&expanded)?,
            factory: Arc::new(move || Box::new(EventStructure::new(events())) as Box<dyn Structure>),
            event: Some(EventInfo {
                name: name.to_string(),
                event_classes: event_classes.iter().map(|c| EventClass::new(*c)).collect(),
            }),
        }));
        Ok(())
    }

    /// Preloading descriptors, ascending by order
    pub fn preloading(&self) -> impl Iterator<Item = &Arc<StructureInfo>> {
        self.preloading.iter()
    }

    /// Normal descriptors, in registration order
    pub fn normal(&self) -> impl Iterator<Item = &Arc<StructureInfo>> {
        self.normal.iter()
    }

    pub fn len(&self) -> usize {
        self.preloading.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParserContext;
    use skript_config::SectionNode;

    struct Dummy(&'static str);

    impl Structure for Dummy {
        fn init(&mut self, _ctx: &mut ParserContext, _result: &ParseResult, _node: &SectionNode) -> Result<bool> {
            Ok(true)
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_preloading_sorted_by_order() {
        let mut registry = StructureRegistry::new();
        registry.register_preloading_structure("late", || Box::new(Dummy("late")), 20, &["late"]).unwrap();
        registry.register_preloading_structure("early", || Box::new(Dummy("early")), 10, &["early"]).unwrap();
        registry.register_preloading_structure("late2", || Box::new(Dummy("late2")), 20, &["late2"]).unwrap();

        let ids: Vec<_> = registry.preloading().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "late2"]);
    }

    #[test]
    fn test_earlier_registration_wins() {
        let mut registry = StructureRegistry::new();
        registry.register_structure("first", || Box::new(Dummy("first")), &["thing <.+>"]).unwrap();
        registry.register_structure("second", || Box::new(Dummy("second")), &["thing x"]).unwrap();

        let m = match_structure("thing x", registry.normal()).unwrap();
        assert_eq!(m.info.id, "first");
        assert_eq!(m.info.create().describe(), "first");
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut registry = StructureRegistry::new();
        registry.register_structure("a", || Box::new(Dummy("a")), &["a"]).unwrap();
        registry.register_structure("a", || Box::new(Dummy("a")), &["a"]).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_matched_pattern_index() {
        let mut registry = StructureRegistry::new();
        registry.register_structure("multi", || Box::new(Dummy("m")), &["alpha", "beta"]).unwrap();
        let m = match_structure("beta", registry.normal()).unwrap();
        assert_eq!(m.result.matched_pattern, 1);
    }
}
