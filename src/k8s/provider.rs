/// Explicit Kubernetes provider bound to a kubeconfig
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::runtime::{Context, CustomResource, Output, Resource, ResourceArgs, ResourceOptions, Urn};

#[derive(Debug, Clone)]
pub struct ProviderArgs {
    pub kubeconfig: Output<String>,
}

impl ResourceArgs for ProviderArgs {
    const TYPE: &'static str = "pulumi:providers:kubernetes";

    fn dependencies(&self) -> BTreeSet<Urn> {
        self.kubeconfig.resources().clone()
    }

    fn secret_inputs(&self) -> BTreeSet<String> {
        if self.kubeconfig.is_secret() {
            ["/kubeconfig".to_string()].into_iter().collect()
        } else {
            BTreeSet::new()
        }
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            Ok(json!({
                "kubeconfig": self.kubeconfig.get().await?,
            }))
        }
        .boxed()
    }
}

/// A declared provider; pass it via [`ResourceOptions::provider`]
#[derive(Debug, Clone)]
pub struct Provider {
    resource: CustomResource,
    /// API server the provider talks to
    pub server: Output<String>,
}

impl Provider {
    /// Declare a provider from a kubeconfig
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: ProviderArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            server: resource.output("/server"),
            resource,
        })
    }
}

impl Resource for Provider {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_kubeconfig_is_flagged() {
        let args = ProviderArgs {
            kubeconfig: Output::known("apiVersion: v1".to_string()).as_secret(),
        };
        assert!(args.secret_inputs().contains("/kubeconfig"));

        let args = ProviderArgs {
            kubeconfig: "apiVersion: v1".into(),
        };
        assert!(args.secret_inputs().is_empty());
    }
}
