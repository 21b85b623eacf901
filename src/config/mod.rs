/// Stack configuration for aks-realtime
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::runtime::Output;

/// Stack configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Project name (used in resource URNs and as the default config namespace)
    pub project: String,

    /// Stack name (e.g., "dev")
    pub stack: String,

    /// Namespaced configuration values, keyed as "namespace:key"
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl StackConfig {
    /// Create an empty configuration for a project and stack
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            config: BTreeMap::new(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StackConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            return Err(Error::Config("project cannot be empty".to_string()));
        }

        if self.stack.is_empty() {
            return Err(Error::Config("stack cannot be empty".to_string()));
        }

        if let Some(key) = self.config.keys().find(|k| !k.contains(':')) {
            return Err(Error::Config(format!(
                "config key '{}' must be namespaced as 'namespace:key'",
                key
            )));
        }

        Ok(())
    }

    /// Set a namespaced value, returning self for chaining
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Generate an example configuration carrying the given public key
    pub fn example(ssh_public_key: &str) -> Self {
        Self::new("realtime", "dev")
            .with_value("realtime:sshkey", ssh_public_key)
            .with_value(
                "azure:subscriptionId",
                "00000000-0000-0000-0000-000000000000",
            )
    }
}

/// Read access to one configuration namespace
pub struct Config<'a> {
    stack: &'a StackConfig,
    namespace: String,
}

impl<'a> Config<'a> {
    pub fn new(stack: &'a StackConfig, namespace: impl Into<String>) -> Self {
        Self {
            stack,
            namespace: namespace.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Get a value from the stack file or its environment fallback
    ///
    /// An empty value counts as unset, so an empty stack entry still falls
    /// back to the environment.
    pub fn get(&self, key: &str) -> Option<String> {
        let full_key = self.full_key(key);
        self.stack
            .config
            .get(&full_key)
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| {
                std::env::var(env_var_name(&full_key))
                    .ok()
                    .filter(|v| !v.is_empty())
            })
    }

    /// Get a value, failing if it is not set anywhere
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| Error::MissingConfig(self.full_key(key)))
    }

    /// Get a required value as a secret output
    ///
    /// Anything built from the returned output stays secret and is masked
    /// wherever the plan is rendered.
    pub fn require_secret(&self, key: &str) -> Result<Output<String>> {
        Ok(Output::known(self.require(key)?).as_secret())
    }
}

/// Environment variable consulted for a namespaced key ("realtime:sshkey" -> "REALTIME_SSHKEY")
pub fn env_var_name(full_key: &str) -> String {
    full_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
