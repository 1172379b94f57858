//! Workflow document persistence.
//!
//! A saved workflow is a JSON document of name, description, settings, and
//! the ordered steps. Step kinds are validated on load (an unknown kind is
//! an error); parameter values are taken as-is so documents written by a
//! newer editor still open.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::step::{Step, StepSequence};
use crate::errors::AutomationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub default_confidence: f32,
    pub default_timeout: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_confidence: 0.8,
            default_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: WorkflowSettings,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl WorkflowFile {
    pub fn from_sequence(name: impl Into<String>, sequence: &StepSequence) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            settings: WorkflowSettings::default(),
            steps: sequence.snapshot(),
        }
    }

    /// Moves the stored steps into an editing sequence.
    pub fn into_sequence(self) -> StepSequence {
        let mut sequence = StepSequence::new();
        sequence.load(self.steps);
        sequence
    }

    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AutomationError::WorkflowFile(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: WorkflowFile = serde_json::from_str(&raw).map_err(|e| {
            AutomationError::WorkflowFile(format!("invalid workflow {}: {e}", path.display()))
        })?;
        info!(name = %file.name, steps = file.steps.len(), "workflow loaded");
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<(), AutomationError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| AutomationError::WorkflowFile(e.to_string()))?;
        fs::write(path, raw).map_err(|e| {
            AutomationError::WorkflowFile(format!("cannot write {}: {e}", path.display()))
        })
    }
}
