//! Class infos
//!
//! A class info describes one value type scripts can name: its code name, the
//! words users write for it, how to parse a literal, and whether (and as what)
//! it can be saved in a variable.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A script value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    /// Any other class, stored by code name and serialized form
    Object { class: String, data: String },
}

impl Value {
    /// Code name of the value's class
    pub fn class_name(&self) -> &str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Object { class, .. } => class,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(t) => f.write_str(t),
            Value::Object { data, .. } => f.write_str(data),
        }
    }
}

type LiteralParser = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;
type Converter = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Description of a value type
#[derive(Clone)]
pub struct ClassInfo {
    code_name: String,
    user_input: Vec<Regex>,
    parser: Option<LiteralParser>,
    serializable: bool,
    serialize_as: Option<String>,
}

impl ClassInfo {
    pub fn new(code_name: &str) -> Self {
        Self {
            code_name: code_name.to_string(),
            user_input: Vec::new(),
            parser: None,
            serializable: true,
            serialize_as: None,
        }
    }

    /// Words users may write for this class, as anchored case-insensitive regexes
    ///
    /// Invalid expressions are logged and skipped.
    pub fn user(mut self, patterns: &[&str]) -> Self {
        for pattern in patterns {
            match Regex::new(&format!("(?i)^(?:{})$", pattern)) {
                Ok(regex) => self.user_input.push(regex),
                Err(e) => tracing::error!("Invalid user input pattern for {}: {}", self.code_name, e),
            }
        }
        self
    }

    pub fn parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Mark the class as impossible to store in variables
    pub fn not_serializable(mut self) -> Self {
        self.serializable = false;
        self
    }

    /// Store values of this class as another class
    pub fn serialize_as(mut self, code_name: &str) -> Self {
        self.serialize_as = Some(code_name.to_string());
        self
    }

    pub fn code_name(&self) -> &str {
        &self.code_name
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    pub fn serialized_as(&self) -> Option<&str> {
        self.serialize_as.as_deref()
    }

    pub fn matches_user_input(&self, input: &str) -> bool {
        self.user_input.iter().any(|r| r.is_match(input.trim()))
    }

    pub fn parse(&self, text: &str) -> Option<Value> {
        self.parser.as_ref().and_then(|p| p(text))
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("code_name", &self.code_name)
            .field("serializable", &self.serializable)
            .field("serialize_as", &self.serialize_as)
            .finish()
    }
}

/// Registered class infos and converters
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    converters: HashMap<(String, String), ConverterEntry>,
}

#[derive(Clone)]
struct ConverterEntry(Converter);

impl fmt::Debug for ConverterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Converter")
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in classes
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        register_default_classes(&mut registry);
        registry
    }

    /// Register a class info; literals are parsed by classes in registration order
    pub fn register(&mut self, info: ClassInfo) {
        if self.exact(info.code_name()).is_some() {
            tracing::debug!("Class '{}' already registered", info.code_name());
            return;
        }
        self.classes.push(info);
    }

    pub fn register_converter<F>(&mut self, from: &str, to: &str, converter: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.converters
            .insert((from.to_string(), to.to_string()), ConverterEntry(Arc::new(converter)));
    }

    /// Class info by code name
    pub fn exact(&self, code_name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.code_name == code_name)
    }

    /// Class info for a type name as written by a user (`player`, `numbers` ...)
    pub fn class_info_from_user_input(&self, input: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.matches_user_input(input))
    }

    /// Most specific registered class of a value, falling back to `object`
    pub fn super_class_info(&self, value: &Value) -> Option<&ClassInfo> {
        self.exact(value.class_name()).or_else(|| self.exact("object"))
    }

    /// Parse a literal as the most general type
    pub fn parse_simple(&self, text: &str) -> Option<Value> {
        let text = text.trim();
        self.classes.iter().find_map(|c| c.parse(text))
    }

    /// Convert a value to another class
    pub fn convert(&self, value: &Value, to: &str) -> Option<Value> {
        if value.class_name() == to {
            return Some(value.clone());
        }
        self.converters
            .get(&(value.class_name().to_string(), to.to_string()))
            .and_then(|c| (c.0)(value))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn quoted<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(prefix)?.trim_start();
    rest.strip_prefix('"')?.strip_suffix('"')
}

fn register_default_classes(registry: &mut ClassRegistry) {
    registry.register(
        ClassInfo::new("boolean")
            .user(&["booleans?"])
            .parser(|s| match s.to_lowercase().as_str() {
                "true" | "yes" | "on" => Some(Value::Boolean(true)),
                "false" | "no" | "off" => Some(Value::Boolean(false)),
                _ => None,
            }),
    );
    registry.register(
        ClassInfo::new("integer")
            .user(&["integers?"])
            .parser(|s| s.parse().ok().map(Value::Integer)),
    );
    registry.register(
        ClassInfo::new("number")
            .user(&["numbers?"])
            .parser(|s| s.parse::<f64>().ok().filter(|n| n.is_finite()).map(Value::Number)),
    );

    let timespan = Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s+(tick|second|minute|hour|day)s?$").ok();
    registry.register(
        ClassInfo::new("timespan")
            .user(&["time ?spans?"])
            .parser(move |s| {
                let caps = timespan.as_ref()?.captures(s)?;
                let amount: f64 = caps[1].parse().ok()?;
                let unit_ms = match caps[2].to_lowercase().as_str() {
                    "tick" => 50.0,
                    "second" => 1_000.0,
                    "minute" => 60_000.0,
                    "hour" => 3_600_000.0,
                    _ => 86_400_000.0,
                };
                Some(Value::Object {
                    class: "timespan".into(),
                    data: format!("{}", (amount * unit_ms).round() as u64),
                })
            }),
    );
    registry.register(
        ClassInfo::new("world")
            .user(&["worlds?"])
            .parser(|s| {
                quoted(s, "world").map(|name| Value::Object {
                    class: "world".into(),
                    data: name.to_string(),
                })
            })
            .not_serializable(),
    );
    registry.register(
        ClassInfo::new("player")
            .user(&["players?"])
            .parser(|s| {
                quoted(s, "player").map(|name| Value::Object {
                    class: "player".into(),
                    data: name.to_string(),
                })
            })
            .serialize_as("offlineplayer"),
    );
    registry.register(ClassInfo::new("offlineplayer").user(&["offline ?players?"]));
    registry.register(
        ClassInfo::new("text")
            .user(&["texts?", "strings?"])
            .parser(|s| {
                s.strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .map(|s| Value::Text(s.replace("\"\"", "\"")))
            }),
    );
    registry.register(ClassInfo::new("object").user(&["objects?"]));

    registry.register_converter("player", "offlineplayer", |value| match value {
        Value::Object { data, .. } => Some(Value::Object {
            class: "offlineplayer".into(),
            data: data.clone(),
        }),
        _ => None,
    });
    registry.register_converter("integer", "number", |value| match value {
        Value::Integer(i) => Some(Value::Number(*i as f64)),
        _ => None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_input_lookup() {
        let registry = ClassRegistry::with_defaults();
        assert_eq!(registry.class_info_from_user_input("player").unwrap().code_name(), "player");
        assert_eq!(registry.class_info_from_user_input("Players").unwrap().code_name(), "player");
        assert_eq!(
            registry.class_info_from_user_input("offline player").unwrap().code_name(),
            "offlineplayer"
        );
        assert_eq!(registry.class_info_from_user_input("string").unwrap().code_name(), "text");
        assert!(registry.class_info_from_user_input("spaceship").is_none());
    }

    #[test]
    fn test_parse_simple_picks_first_parser() {
        let registry = ClassRegistry::with_defaults();
        assert_eq!(registry.parse_simple("0"), Some(Value::Integer(0)));
        assert_eq!(registry.parse_simple("2.5"), Some(Value::Number(2.5)));
        assert_eq!(registry.parse_simple("yes"), Some(Value::Boolean(true)));
        assert_eq!(registry.parse_simple("\"hi\""), Some(Value::Text("hi".into())));
        assert_eq!(
            registry.parse_simple("2 seconds"),
            Some(Value::Object {
                class: "timespan".into(),
                data: "2000".into()
            })
        );
        assert!(registry.parse_simple("what is this").is_none());
    }

    #[test]
    fn test_serialize_as_conversion() {
        let registry = ClassRegistry::with_defaults();
        let player = registry.parse_simple("player \"Notch\"").unwrap();
        let info = registry.super_class_info(&player).unwrap();
        assert_eq!(info.serialized_as(), Some("offlineplayer"));

        let stored = registry.convert(&player, "offlineplayer").unwrap();
        assert_eq!(stored.class_name(), "offlineplayer");
        assert_eq!(stored.to_string(), "Notch");

        let world = registry.parse_simple("world \"nether\"").unwrap();
        assert!(!registry.super_class_info(&world).unwrap().is_serializable());
    }

    #[test]
    fn test_value_json() {
        let json = serde_json::to_string(&Value::Integer(3)).unwrap();
        assert_eq!(json, r#"{"type":"integer","value":3}"#);
    }
}
