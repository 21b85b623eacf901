/// apps/v1 resources
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

use super::core::PodTemplateSpec;
use super::meta::{LabelSelector, ObjectMeta, ObjectMetaArgs};
use crate::error::Result;
use crate::runtime::{Context, CustomResource, Output, Resource, ResourceArgs, ResourceOptions, Urn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub replicas: i32,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
}

/// Arguments for a deployment
#[derive(Debug, Clone)]
pub struct DeploymentArgs {
    pub metadata: ObjectMetaArgs,
    pub spec: DeploymentSpec,
}

impl ResourceArgs for DeploymentArgs {
    const TYPE: &'static str = "kubernetes:apps/v1:Deployment";

    fn validate(&self) -> std::result::Result<(), String> {
        self.metadata.validate()?;

        if self.spec.replicas < 0 {
            return Err(format!("replicas cannot be negative ({})", self.spec.replicas));
        }

        let selector = &self.spec.selector.match_labels;
        if selector.is_empty() {
            return Err("selector cannot be empty".to_string());
        }

        // The selector must match the pods the template creates
        let template_labels = &self.spec.template.metadata.labels;
        if let Some((key, value)) = selector
            .iter()
            .find(|(k, v)| template_labels.get(*k) != Some(*v))
        {
            return Err(format!(
                "selector {}={} does not match the pod template labels",
                key, value
            ));
        }

        self.spec.template.spec.validate()
    }

    fn dependencies(&self) -> BTreeSet<Urn> {
        self.metadata.dependencies()
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            Ok(json!({
                "metadata": self.metadata.resolve().await?,
                "spec": self.spec,
            }))
        }
        .boxed()
    }
}

/// A declared deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    resource: CustomResource,
    pub metadata: Output<ObjectMeta>,
    pub spec: Output<DeploymentSpec>,
}

impl Deployment {
    /// Declare a deployment
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: DeploymentArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            metadata: resource.output("/metadata"),
            spec: resource.output("/spec"),
            resource,
        })
    }
}

impl Resource for Deployment {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}
