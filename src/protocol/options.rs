//! Enqueue options and priority types
//!
//! Types for configuring individual jobs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Priority levels for jobs waiting on a slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i8)]
pub enum JobPriority {
    /// Low priority - admitted last
    Low = -1,
    /// Normal priority - default for most jobs
    #[default]
    Normal = 0,
    /// High priority - admitted before normal
    High = 1,
    /// Critical priority - admitted first
    Critical = 2,
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "-1" => Ok(Self::Low),
            "normal" | "0" => Ok(Self::Normal),
            "high" | "1" => Ok(Self::High),
            "critical" | "2" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Options for enqueueing a track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Slot ordering among pending jobs
    #[serde(default)]
    pub priority: JobPriority,
    /// Directory to save into (defaults to the engine's download dir)
    pub save_dir: Option<PathBuf>,
    /// Output file name (defaults to the candidate's remote file name)
    pub filename: Option<String>,
}

impl EnqueueOptions {
    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(JobPriority::Critical > JobPriority::High);
        assert!(JobPriority::High > JobPriority::Normal);
        assert!(JobPriority::Normal > JobPriority::Low);
    }

    #[test]
    fn priority_from_str() {
        assert_eq!("low".parse::<JobPriority>().unwrap(), JobPriority::Low);
        assert_eq!("HIGH".parse::<JobPriority>().unwrap(), JobPriority::High);
        assert_eq!("2".parse::<JobPriority>().unwrap(), JobPriority::Critical);
        assert!("urgent".parse::<JobPriority>().is_err());
    }
}
