//! Skript Configuration Management
//!
//! Holds the script node tree (shared by script files and `config.sk`) and the
//! loader settings read from `config.sk`.

pub mod node;

pub use node::{EntryNode, Node, NodeError, SectionNode, SimpleNode};

use skript_core::{EventPriority, Result, SkriptError};
use std::fs;
use std::path::{Path, PathBuf};

/// Log verbosity requested by the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Low,
    Normal,
    High,
    VeryHigh,
    Debug,
}

impl Verbosity {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().replace(' ', "").as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "veryhigh" => Some(Self::VeryHigh),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    /// Matching `tracing` filter directive
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Self::Low => "warn",
            Self::Normal => "info",
            Self::High | Self::VeryHigh => "debug",
            Self::Debug => "trace",
        }
    }
}

/// Script loader configuration from `config.sk`
#[derive(Debug, Clone)]
pub struct SkriptConfig {
    /// Priority used by event triggers that do not declare one (from "default event priority")
    pub default_event_priority: EventPriority,
    /// Parse scripts on a worker thread (from "asynchronous script loading")
    pub async_loading: bool,
    /// Folder scanned for scripts (from "scripts folder")
    pub scripts_folder: PathBuf,
    /// Script file extension without the dot (from "script file extension")
    pub script_extension: String,
    /// Files starting with this prefix are not loaded (from "disabled script prefix")
    pub disabled_prefix: String,
    /// Function recursion limit (from "max function call depth")
    pub max_call_depth: usize,
    /// Log verbosity (from "verbosity")
    pub verbosity: Verbosity,
}

impl Default for SkriptConfig {
    fn default() -> Self {
        Self {
            default_event_priority: EventPriority::Normal,
            async_loading: false,
            scripts_folder: PathBuf::from("scripts"),
            script_extension: "sk".into(),
            disabled_prefix: "-".into(),
            max_call_depth: 256,
            verbosity: Verbosity::Normal,
        }
    }
}

impl SkriptConfig {
    /// Load configuration from a `config.sk` file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::parse(&path.to_string_lossy(), &content)
    }

    /// Load `config.sk` from the given folder, falling back to defaults when it is missing
    pub fn load_default<P: AsRef<Path>>(folder: P) -> Result<Self> {
        let path = folder.as_ref().join("config.sk");
        if !path.exists() {
            tracing::info!("No config.sk in {}, using defaults", folder.as_ref().display());
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Parse `config.sk` content
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let root = SectionNode::parse(name, content)
            .map_err(|e| SkriptError::Config(e.to_string()))?
            .convert_to_entries(-1, ":");

        let mut config = Self::default();
        for node in &root {
            match node {
                Node::Entry(entry) => config.parse_option(&entry.key, &entry.value),
                other => tracing::warn!("Ignoring line {} of {}: not a 'key: value' entry", other.line(), name),
            }
        }
        Ok(config)
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key.to_lowercase().as_str() {
            "default event priority" => match value.parse() {
                Ok(priority) => self.default_event_priority = priority,
                Err(e) => tracing::warn!("{}, keeping {}", e, self.default_event_priority),
            },
            "asynchronous script loading" => {
                self.async_loading = parse_bool(value).unwrap_or_else(|| {
                    tracing::warn!("Invalid boolean '{}' for asynchronous script loading", value);
                    false
                });
            }
            "scripts folder" => self.scripts_folder = PathBuf::from(value),
            "script file extension" => {
                self.script_extension = value.trim_start_matches('.').to_string();
            }
            "disabled script prefix" => self.disabled_prefix = value.into(),
            "max function call depth" => {
                self.max_call_depth = value.parse().unwrap_or_else(|_| {
                    tracing::warn!("Invalid number '{}' for max function call depth", value);
                    256
                });
            }
            "verbosity" => {
                self.verbosity = Verbosity::parse(value).unwrap_or_else(|| {
                    tracing::warn!("Unknown verbosity '{}'", value);
                    Verbosity::Normal
                });
            }
            _ => {
                tracing::debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Whether a file in the scripts folder should be loaded
    pub fn is_script_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        let extension_matches = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(&self.script_extension))
            .unwrap_or(false);
        extension_matches && (self.disabled_prefix.is_empty() || !name.starts_with(&self.disabled_prefix))
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Script loader configuration:");
        tracing::info!("    Default event priority: {}", self.default_event_priority);
        tracing::info!("    Asynchronous loading: {}", self.async_loading);
        tracing::info!("    Scripts folder: {}", self.scripts_folder.display());
        tracing::info!("    Script extension: .{}", self.script_extension);
        tracing::info!("    Disabled prefix: '{}'", self.disabled_prefix);
        tracing::info!("    Max function call depth: {}", self.max_call_depth);
        tracing::info!("    Verbosity: {:?}", self.verbosity);
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
