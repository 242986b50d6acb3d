//! Build-definition parsing
//!
//! Turns the raw `.drone.yml` text fetched from the hosting service into an
//! executable build plan. The pipeline talks to this through the
//! [`ScriptParser`] trait so tests can substitute their own parser.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::HookError;

/// Parsed, executable representation of a build definition file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Image the build runs in
    pub image: Option<String>,
    /// Environment entries, `KEY=value`
    #[serde(default)]
    pub env: Vec<String>,
    /// Shell commands executed in order
    #[serde(default)]
    pub script: Vec<String>,
    /// Sidecar service images
    #[serde(default)]
    pub services: Vec<String>,
}

/// Collaborator that parses raw definition bytes into a [`BuildPlan`]
pub trait ScriptParser: Send + Sync {
    fn parse_build(&self, raw: &[u8], params: &HashMap<String, String>)
    -> Result<BuildPlan, HookError>;
}

/// Default parser: repository parameters are substituted as `{{name}}`
/// placeholders, then the result is decoded as YAML.
pub struct YamlScriptParser;

impl ScriptParser for YamlScriptParser {
    fn parse_build(
        &self,
        raw: &[u8],
        params: &HashMap<String, String>,
    ) -> Result<BuildPlan, HookError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| HookError::DefinitionError(format!("definition is not UTF-8: {}", e)))?;
        let text = inject_params(text, params);

        // An empty or comment-only file decodes as YAML null; reject it
        // before serde reports a less helpful type error.
        let value: serde_yaml::Value = serde_yaml::from_str(&text)
            .map_err(|e| HookError::DefinitionError(e.to_string()))?;
        if value.is_null() {
            return Err(HookError::DefinitionError(
                "definition file is empty".to_string(),
            ));
        }

        serde_yaml::from_value(value).map_err(|e| HookError::DefinitionError(e.to_string()))
    }
}

/// Replace `{{name}}` placeholders with repository-level parameter values.
fn inject_params(text: &str, params: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{{{}}}}}", key), value);
    }
    out
}

pub type SharedScriptParser = Arc<dyn ScriptParser>;
