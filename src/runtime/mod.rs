/// Declaration runtime: run context, outputs and the resource graph
pub mod context;
pub mod graph;
pub mod output;

pub use context::{Context, CustomResource, ResourceState, RunSummary};
pub use graph::{ResourceGraph, ResourceNode};
pub use output::{Output, OutputValue};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;

/// Stable logical identity of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    pub fn new(stack: &str, project: &str, type_token: &str, name: &str) -> Self {
        Self(format!(
            "urn:pulumi:{}::{}::{}::{}",
            stack, project, type_token, name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Logical name (last URN segment)
    pub fn name(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or_default()
    }

    /// Type token (third URN segment)
    pub fn type_token(&self) -> &str {
        self.0.split("::").nth(2).unwrap_or_default()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package a type token belongs to ("azure:core/resourceGroup:ResourceGroup" -> "azure")
///
/// Provider tokens name their package last ("pulumi:providers:kubernetes").
pub fn package_of(type_token: &str) -> &str {
    match type_token.strip_prefix("pulumi:providers:") {
        Some(package) => package,
        None => type_token.split(':').next().unwrap_or_default(),
    }
}

/// Whether a type token names a provider resource
pub fn is_provider_type(type_token: &str) -> bool {
    type_token.starts_with("pulumi:providers:")
}

/// Anything that has been registered with a [`Context`]
pub trait Resource {
    fn urn(&self) -> &Urn;
}

/// Typed arguments of one resource type
pub trait ResourceArgs: Send + 'static {
    /// Type token, e.g. "azure:core/resourceGroup:ResourceGroup"
    const TYPE: &'static str;

    /// Check the arguments before anything is registered
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Resources whose outputs flow into these arguments
    fn dependencies(&self) -> BTreeSet<Urn>;

    /// JSON pointers of inputs that carry secret values
    fn secret_inputs(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Wait for every input output and produce the property bag sent to the engine
    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>>;
}

/// Per-declaration options
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub depends_on: Vec<Urn>,
    pub provider: Option<Urn>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit dependency
    pub fn depends_on(mut self, resource: &impl Resource) -> Self {
        self.depends_on.push(resource.urn().clone());
        self
    }

    /// Route the resource through an explicit provider
    pub fn provider(mut self, provider: &impl Resource) -> Self {
        self.provider = Some(provider.urn().clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn_parts() {
        let urn = Urn::new("dev", "realtime", "kubernetes:apps/v1:Deployment", "redisapp");
        assert_eq!(
            urn.as_str(),
            "urn:pulumi:dev::realtime::kubernetes:apps/v1:Deployment::redisapp"
        );
        assert_eq!(urn.name(), "redisapp");
        assert_eq!(urn.type_token(), "kubernetes:apps/v1:Deployment");
    }

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("azure:core/resourceGroup:ResourceGroup"), "azure");
        assert_eq!(package_of("kubernetes:core/v1:Namespace"), "kubernetes");
        assert_eq!(package_of("pulumi:providers:kubernetes"), "kubernetes");
        assert!(is_provider_type("pulumi:providers:kubernetes"));
        assert!(!is_provider_type("kubernetes:core/v1:Service"));
    }
}
