//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Load generation of a script (monotonic per process)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoadGeneration(pub u64);

impl LoadGeneration {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Identity of a loaded script file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    path: PathBuf,
    name: String,
    generation: LoadGeneration,
}

impl Script {
    pub fn new(path: impl Into<PathBuf>, generation: LoadGeneration) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name, generation }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name (file name without directories)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> LoadGeneration {
        self.generation
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Structure load priority, lower values load earlier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const fn new(priority: i32) -> Self {
        Self(priority)
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl From<i32> for Priority {
    fn from(priority: i32) -> Self {
        Self(priority)
    }
}

/// Host event priority, the point in dispatch at which a trigger observes an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

impl EventPriority {
    pub const ALL: [EventPriority; 6] = [
        Self::Lowest,
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Highest,
        Self::Monitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Highest => "highest",
            Self::Monitor => "monitor",
        }
    }
}

impl Default for EventPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a priority name outside the host vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event priority: {0}")]
pub struct UnknownEventPriority(pub String);

impl FromStr for EventPriority {
    type Err = UnknownEventPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lowest" => Ok(Self::Lowest),
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "highest" => Ok(Self::Highest),
            "monitor" => Ok(Self::Monitor),
            _ => Err(UnknownEventPriority(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_priority_parsing_ignores_case() {
        assert_eq!("HIGHEST".parse::<EventPriority>().unwrap(), EventPriority::Highest);
        assert_eq!("Monitor".parse::<EventPriority>().unwrap(), EventPriority::Monitor);
        assert!("urgent".parse::<EventPriority>().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::new(10) < Priority::new(30));
        assert!(EventPriority::Lowest < EventPriority::Monitor);
    }

    #[test]
    fn test_script_name() {
        let script = Script::new("scripts/chat.sk", LoadGeneration(3));
        assert_eq!(script.name(), "chat.sk");
        assert_eq!(script.generation().get(), 3);
    }
}
