/// core/v1 resources: namespaces, services and pod building blocks
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

use super::meta::{ObjectMeta, ObjectMetaArgs};
use crate::error::{Error, Result};
use crate::runtime::{Context, CustomResource, Output, Resource, ResourceArgs, ResourceOptions, Urn};

/// A port exposed by a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub container_port: u16,
}

/// A literal environment variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    pub containers: Vec<Container>,
}

impl PodSpec {
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.containers.is_empty() {
            return Err("pod needs at least one container".to_string());
        }

        let mut names = BTreeSet::new();
        for container in &self.containers {
            if container.name.is_empty() {
                return Err("container name cannot be empty".to_string());
            }
            if !names.insert(container.name.as_str()) {
                return Err(format!("duplicate container name '{}'", container.name));
            }
            if container.image.is_empty() {
                return Err(format!("container '{}' has no image", container.name));
            }
            if container.ports.iter().any(|p| p.container_port == 0) {
                return Err(format!("container '{}' exposes port 0", container.name));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

/// How a service is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    /// Reachable only from inside the cluster
    ClusterIP,
    NodePort,
    /// Provisioned with an external load balancer
    LoadBalancer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub ports: Vec<ServicePort>,
    pub selector: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub type_: ServiceType,
}

/// Arguments for a namespace
#[derive(Debug, Clone, Default)]
pub struct NamespaceArgs {
    pub metadata: ObjectMetaArgs,
}

impl ResourceArgs for NamespaceArgs {
    const TYPE: &'static str = "kubernetes:core/v1:Namespace";

    fn validate(&self) -> std::result::Result<(), String> {
        if self.metadata.namespace.is_some() {
            return Err("namespaces are not namespaced".to_string());
        }
        self.metadata.validate()
    }

    fn dependencies(&self) -> BTreeSet<Urn> {
        self.metadata.dependencies()
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            Ok(json!({
                "metadata": self.metadata.resolve().await?,
            }))
        }
        .boxed()
    }
}

/// A declared namespace
#[derive(Debug, Clone)]
pub struct Namespace {
    resource: CustomResource,
    pub metadata: Output<ObjectMeta>,
}

impl Namespace {
    /// Declare a namespace through a Kubernetes provider
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: NamespaceArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            metadata: resource.output("/metadata"),
            resource,
        })
    }

    /// Physical namespace name
    pub fn name(&self) -> Output<String> {
        self.resource.output("/metadata/name")
    }
}

impl Resource for Namespace {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}

/// Arguments for a service
#[derive(Debug, Clone)]
pub struct ServiceArgs {
    pub metadata: ObjectMetaArgs,
    pub spec: ServiceSpec,
}

impl ResourceArgs for ServiceArgs {
    const TYPE: &'static str = "kubernetes:core/v1:Service";

    fn validate(&self) -> std::result::Result<(), String> {
        self.metadata.validate()?;

        if self.spec.ports.is_empty() {
            return Err("service needs at least one port".to_string());
        }
        if self
            .spec
            .ports
            .iter()
            .any(|p| p.port == 0 || p.target_port == 0)
        {
            return Err("service ports must be non-zero".to_string());
        }
        if self.spec.selector.is_empty() {
            return Err("service selector cannot be empty".to_string());
        }

        Ok(())
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

/// A declared service
#[derive(Debug, Clone)]
pub struct Service {
    resource: CustomResource,
    pub metadata: Output<ObjectMeta>,
    pub spec: Output<ServiceSpec>,
}

impl Service {
    /// Declare a service
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: ServiceArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            metadata: resource.output("/metadata"),
            spec: resource.output("/spec"),
            resource,
        })
    }

    /// In-cluster DNS address ("name.namespace:port") of the first port
    pub fn address(&self) -> Output<String> {
        self.metadata.zip(&self.spec).apply(|(metadata, spec)| {
            let name = metadata
                .name
                .ok_or_else(|| Error::output("service has no name"))?;
            let namespace = metadata.namespace.unwrap_or_else(|| "default".to_string());
            let port = spec
                .ports
                .first()
                .map(|p| p.port)
                .ok_or_else(|| Error::output(format!("service {} exposes no ports", name)))?;
            Ok(format!("{}.{}:{}", name, namespace, port))
        })
    }
}

impl Resource for Service {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::meta::labels;

    fn service(selector: &[(&str, &str)], ports: Vec<ServicePort>) -> ServiceArgs {
        ServiceArgs {
            metadata: ObjectMetaArgs {
                name: Some("redisapp".to_string()),
                namespace: Some("realtime".into()),
                labels: labels(selector),
            },
            spec: ServiceSpec {
                ports,
                selector: labels(selector),
                type_: ServiceType::ClusterIP,
            },
        }
    }

    #[test]
    fn test_service_validation() {
        let port = ServicePort {
            port: 6379,
            target_port: 6379,
        };
        assert!(service(&[("app", "redisapp")], vec![port.clone()])
            .validate()
            .is_ok());
        assert!(service(&[("app", "redisapp")], vec![]).validate().is_err());
        assert!(service(&[], vec![port]).validate().is_err());
    }

    #[test]
    fn test_namespace_cannot_be_namespaced() {
        let args = NamespaceArgs {
            metadata: ObjectMetaArgs {
                name: Some("realtime".to_string()),
                namespace: Some("default".into()),
                ..Default::default()
            },
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_pod_spec_validation() {
        let container = Container {
            name: "redisapp".to_string(),
            image: "redis:4-32bit".to_string(),
            ports: vec![ContainerPort {
                container_port: 6379,
            }],
            env: vec![],
        };
        let ok = PodSpec {
            containers: vec![container.clone()],
        };
        assert!(ok.validate().is_ok());

        let dup = PodSpec {
            containers: vec![container.clone(), container],
        };
        assert!(dup.validate().unwrap_err().contains("duplicate"));

        let empty = PodSpec { containers: vec![] };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_service_type_serialization() {
        assert_eq!(
            serde_json::to_value(ServiceType::LoadBalancer).unwrap(),
            "LoadBalancer"
        );
        assert_eq!(
            serde_json::to_value(ServiceType::ClusterIP).unwrap(),
            "ClusterIP"
        );
    }
}
