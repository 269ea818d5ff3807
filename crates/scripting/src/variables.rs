//! Variable store
//!
//! Variables are named by `::`-separated paths. A stored name with `<type>`
//! segments (`score::<player>`) is a default variable: it answers lookups of
//! any missing concrete name with the same shape.

use crate::classes::Value;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Persistent variable storage, safe to use from any thread
pub trait VariableStore: Send + Sync {
    /// The value stored under exactly `name`
    fn get_variable(&self, name: &str) -> Option<Value>;

    /// Store or (with `None`) delete a variable
    fn set_variable(&self, name: &str, value: Option<Value>);
}

/// In-memory variable store
#[derive(Debug, Default)]
pub struct InMemoryVariableStore {
    variables: DashMap<String, Value>,
}

impl InMemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable, falling back to a matching default variable
    pub fn resolve(&self, name: &str) -> Option<Value> {
        let name = name.to_lowercase();
        if let Some(value) = self.variables.get(&name) {
            return Some(value.clone());
        }

        let wanted: Vec<&str> = name.split("::").collect();
        self.variables.iter().find_map(|entry| {
            let template: Vec<&str> = entry.key().split("::").collect();
            let matches = template.len() == wanted.len()
                && template.iter().zip(&wanted).all(|(t, w)| is_type_segment(t) || t == w);
            matches.then(|| entry.value().clone())
        })
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Names of stored variables, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All variables as pretty JSON, keys sorted
    pub fn to_json(&self) -> serde_json::Result<String> {
        let sorted: BTreeMap<String, Value> = self
            .variables
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        serde_json::to_string_pretty(&sorted)
    }
}

impl VariableStore for InMemoryVariableStore {
    fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(&name.to_lowercase()).map(|v| v.clone())
    }

    fn set_variable(&self, name: &str, value: Option<Value>) {
        let name = name.to_lowercase();
        match value {
            Some(value) => {
                tracing::trace!("Set variable {} = {}", name, value);
                self.variables.insert(name, value);
            }
            None => {
                self.variables.remove(&name);
            }
        }
    }
}

fn is_type_segment(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('<') && segment.ends_with('>')
}
