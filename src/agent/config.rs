/*!
 * Agent Configuration
 * Identity of the embedding application, surfaced in diagnostics
 */

use serde::{Deserialize, Serialize};

/// Configuration for an [`Agent`](super::Agent)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    pub app_name: String,
    pub environment: String,
    pub hostname: Option<String>,
}

impl AgentConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            environment: "development".to_string(),
            hostname: None,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}
