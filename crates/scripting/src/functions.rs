//! Script functions
//!
//! A function is declared in two steps: its signature is registered while the
//! script is preloaded, so any body can refer to it, and its body is attached
//! during load. Both are owned by the declaring script.

use crate::classes::ClassRegistry;
use crate::error::{Result, ScriptError};
use crate::event::HostEvent;
use crate::host::Environment;
use crate::items::{run_items, Flow, TriggerItem};
use parking_lot::RwLock;
use regex::Regex;
use skript_core::Script;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Code name of the parameter's class
    pub type_name: String,
    pub default: Option<String>,
}

/// Name, parameters and return type of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub script: Arc<Script>,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<String>,
    pub line: usize,
}

impl Signature {
    /// Whether a call with `count` arguments binds to this signature
    pub fn accepts(&self, count: usize) -> bool {
        let required = self.parameters.iter().filter(|p| p.default.is_none()).count();
        count >= required && count <= self.parameters.len()
    }
}

/// A function with its body
#[derive(Debug)]
pub struct Function {
    signature: Arc<Signature>,
    items: Vec<TriggerItem>,
}

impl Function {
    pub fn new(signature: Signature, items: Vec<TriggerItem>) -> Self {
        Self {
            signature: Arc::new(signature),
            items,
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

fn signature_regex() -> Option<&'static Regex> {
    static SIGNATURE: OnceLock<Option<Regex>> = OnceLock::new();
    SIGNATURE
        .get_or_init(|| Regex::new(r"(?i)^([A-Za-z_]\w*)\s*\((.*)\)\s*(?:(?:::|returns)\s*(.+?))?\s*$").ok())
        .as_ref()
}

fn parameter_regex() -> Option<&'static Regex> {
    static PARAMETER: OnceLock<Option<Regex>> = OnceLock::new();
    PARAMETER
        .get_or_init(|| Regex::new(r"^([A-Za-z_]\w*)\s*:\s*(.+?)(?:\s*=\s*(.+))?$").ok())
        .as_ref()
}

/// Parse `name(param: type = default, ...) :: type`
pub fn parse_signature(classes: &ClassRegistry, script: &Arc<Script>, text: &str, line: usize) -> Result<Signature> {
    let caps = signature_regex()
        .and_then(|r| r.captures(text.trim()))
        .ok_or_else(|| ScriptError::parse(line, format!("Invalid function signature '{}'", text)))?;

    let name = caps[1].to_string();
    let mut parameters: Vec<Parameter> = Vec::new();
    for raw in caps[2].split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let param = parameter_regex()
            .and_then(|r| r.captures(raw))
            .ok_or_else(|| ScriptError::parse(line, format!("Invalid parameter '{}' of function '{}'", raw, name)))?;
        let param_name = param[1].to_string();
        if parameters.iter().any(|p| p.name.eq_ignore_ascii_case(&param_name)) {
            return Err(ScriptError::parse(
                line,
                format!("Parameter '{}' is declared twice in function '{}'", param_name, name),
            ));
        }
        let class = classes
            .class_info_from_user_input(&param[2])
            .ok_or_else(|| ScriptError::parse(line, format!("Cannot recognise the type '{}'", &param[2])))?;
        parameters.push(Parameter {
            name: param_name,
            type_name: class.code_name().to_string(),
            default: param.get(3).map(|d| d.as_str().trim().to_string()),
        });
    }

    let return_type = match caps.get(3) {
        Some(raw) => Some(
            classes
                .class_info_from_user_input(raw.as_str())
                .ok_or_else(|| ScriptError::parse(line, format!("Cannot recognise the type '{}'", raw.as_str())))?
                .code_name()
                .to_string(),
        ),
        None => None,
    };

    Ok(Signature {
        script: Arc::clone(script),
        name,
        parameters,
        return_type,
        line,
    })
}

fn unquote(arg: &str) -> String {
    let arg = arg.trim();
    arg.strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .unwrap_or(arg)
        .to_string()
}

/// Registered signatures and function bodies
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    signatures: RwLock<HashMap<String, Arc<Signature>>>,
    functions: RwLock<HashMap<String, Arc<Function>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a function; names are unique across scripts
    pub fn register_signature(&self, signature: Signature) -> Result<Arc<Signature>> {
        let mut signatures = self.signatures.write();
        if let Some(existing) = signatures.get(&signature.name) {
            return Err(ScriptError::parse(
                signature.line,
                format!(
                    "A function named '{}' already exists in {}",
                    signature.name,
                    existing.script.name()
                ),
            ));
        }
        let signature = Arc::new(signature);
        signatures.insert(signature.name.clone(), Arc::clone(&signature));
        tracing::debug!("Registered signature of function {}", signature.name);
        Ok(signature)
    }

    pub fn signature(&self, name: &str) -> Option<Arc<Signature>> {
        self.signatures.read().get(name).cloned()
    }

    /// Attach a body to a declared signature
    pub fn register_function(&self, function: Function) -> Result<()> {
        let declared = self.signature(&function.signature.name);
        if declared.as_deref() != Some(function.signature()) {
            return Err(ScriptError::bind(
                function.signature.line,
                format!("Function '{}' was not declared", function.signature.name),
            ));
        }
        self.functions
            .write()
            .insert(function.signature.name.clone(), Arc::new(function));
        Ok(())
    }

    /// Remove a function and its signature if they still belong to `signature`'s script
    pub fn unregister(&self, signature: &Signature) -> bool {
        let mut signatures = self.signatures.write();
        match signatures.get(&signature.name) {
            Some(existing) if existing.script == signature.script => {
                signatures.remove(&signature.name);
                self.functions.write().remove(&signature.name);
                tracing::debug!("Unregistered function {}", signature.name);
                true
            }
            _ => false,
        }
    }

    /// Remove everything declared by a script
    pub fn unregister_script(&self, script: &Script) -> usize {
        let mut signatures = self.signatures.write();
        let owned: Vec<String> = signatures
            .values()
            .filter(|s| *s.script == *script)
            .map(|s| s.name.clone())
            .collect();
        let mut functions = self.functions.write();
        for name in &owned {
            signatures.remove(name);
            functions.remove(name);
        }
        owned.len()
    }

    /// Number of declared signatures
    pub fn len(&self) -> usize {
        self.signatures.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of functions with a body
    pub fn function_count(&self) -> usize {
        self.functions.read().len()
    }

    /// Call a function by name
    ///
    /// Arguments are bound to the locals `{_param}` of the body. `depth` is the
    /// caller's call depth; exceeding the configured maximum fails with
    /// [`ScriptError::StackOverflow`].
    pub fn call(&self, name: &str, args: Vec<String>, env: &Environment, depth: usize) -> Result<Option<String>> {
        if depth >= env.max_call_depth {
            return Err(ScriptError::StackOverflow);
        }

        let function = self
            .functions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::Runtime(format!("The function '{}' is not loaded", name)))?;

        let mut event = HostEvent::new("function").with_field("function", name);
        let mut args = args.into_iter();
        for parameter in &function.signature.parameters {
            let value = match args.next() {
                Some(arg) => unquote(&arg),
                None => match &parameter.default {
                    Some(default) => unquote(default),
                    None => {
                        return Err(ScriptError::Runtime(format!(
                            "Missing argument '{}' in call to '{}'",
                            parameter.name, name
                        )))
                    }
                },
            };
            event.fields.insert(format!("_{}", parameter.name), value);
        }

        match run_items(&function.items, &mut event, env, depth + 1)? {
            Flow::Return(value) => Ok(value),
            Flow::Continue => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use skript_config::SkriptConfig;
    use skript_core::LoadGeneration;

    fn script(name: &str) -> Arc<Script> {
        Arc::new(Script::new(name, LoadGeneration(1)))
    }

    #[test]
    fn test_parse_signature() {
        let classes = ClassRegistry::with_defaults();
        let sig = parse_signature(&classes, &script("a.sk"), "give(p: player, amount: number = 1) :: boolean", 4)
            .unwrap();
        assert_eq!(sig.name, "give");
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(sig.parameters[0].type_name, "player");
        assert_eq!(sig.parameters[1].default.as_deref(), Some("1"));
        assert_eq!(sig.return_type.as_deref(), Some("boolean"));
        assert!(sig.accepts(1) && sig.accepts(2));
        assert!(!sig.accepts(0) && !sig.accepts(3));

        assert!(parse_signature(&classes, &script("a.sk"), "f(x: spaceship)", 1).is_err());
        assert!(parse_signature(&classes, &script("a.sk"), "f(x: text, x: text)", 1).is_err());
        assert!(parse_signature(&classes, &script("a.sk"), "not a signature", 1).is_err());
    }

    #[test]
    fn test_duplicate_and_ownership() {
        let classes = ClassRegistry::with_defaults();
        let registry = FunctionRegistry::new();
        let a = script("a.sk");
        let b = script("b.sk");

        registry
            .register_signature(parse_signature(&classes, &a, "f()", 1).unwrap())
            .unwrap();
        let other = parse_signature(&classes, &b, "f()", 1).unwrap();
        assert!(registry.register_signature(other.clone()).is_err());
        assert!(!registry.unregister(&other));
        assert_eq!(registry.unregister_script(&a), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_recursion_limit() {
        let mut config = SkriptConfig::default();
        config.max_call_depth = 8;
        let host = InMemoryHost::new(config);
        let functions = &host.host.functions;
        let sig = parse_signature(&host.host.classes, &script("a.sk"), "loop()", 1).unwrap();
        functions.register_signature(sig.clone()).unwrap();
        functions
            .register_function(Function::new(
                sig,
                vec![TriggerItem::FunctionCall {
                    name: "loop".into(),
                    args: vec![],
                    line: 2,
                }],
            ))
            .unwrap();

        let err = functions.call("loop", vec![], &host.environment(), 0).unwrap_err();
        assert_eq!(err, ScriptError::StackOverflow);
    }

    #[test]
    fn test_return_value_and_defaults() {
        let host = InMemoryHost::new(SkriptConfig::default());
        let functions = &host.host.functions;
        let sig = parse_signature(&host.host.classes, &script("a.sk"), "echo(v: text = \"none\") :: text", 1).unwrap();
        functions.register_signature(sig.clone()).unwrap();
        functions
            .register_function(Function::new(
                sig,
                vec![TriggerItem::Return {
                    value: Some("{_v}".into()),
                    line: 2,
                }],
            ))
            .unwrap();

        let env = host.environment();
        assert_eq!(functions.call("echo", vec!["\"x\"".into()], &env, 0).unwrap().as_deref(), Some("x"));
        assert_eq!(functions.call("echo", vec![], &env, 0).unwrap().as_deref(), Some("none"));
        assert!(functions.call("missing", vec![], &env, 0).is_err());
    }
}
