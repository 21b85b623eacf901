/// Managed Kubernetes clusters (AKS)
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::runtime::{Context, CustomResource, Output, Resource, ResourceArgs, ResourceOptions, Urn};
use crate::utils::cidr::Ipv4Cidr;
use crate::utils::ssh::check_public_key;

/// Network plugin used by cluster nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPlugin {
    /// Azure CNI: pods get addresses from the node subnet
    Azure,
    Kubenet,
}

/// Identity the cluster uses to manage Azure resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityType {
    SystemAssigned,
}

/// Cluster network profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    pub network_plugin: NetworkPlugin,
    pub dns_service_ip: String,
    pub service_cidr: String,
    pub docker_bridge_cidr: String,
}

impl NetworkProfile {
    fn validate(&self) -> std::result::Result<(), String> {
        let service_cidr: Ipv4Cidr = self.service_cidr.parse()?;
        let dns_ip: Ipv4Addr = self
            .dns_service_ip
            .parse()
            .map_err(|_| format!("invalid DNS service IP {}", self.dns_service_ip))?;

        if !service_cidr.contains_addr(dns_ip) {
            return Err(format!(
                "DNS service IP {} is outside service CIDR {}",
                dns_ip, service_cidr
            ));
        }

        let bridge: Ipv4Cidr = self.docker_bridge_cidr.parse()?;
        if bridge.overlaps(&service_cidr) {
            return Err(format!(
                "Docker bridge CIDR {} overlaps service CIDR {}",
                bridge, service_cidr
            ));
        }

        Ok(())
    }
}

/// SSH public key installed for the admin user
///
/// The key usually comes from a secret config value, so it is carried as an
/// output and its shape is checked once it resolves.
#[derive(Debug, Clone)]
pub struct SshKey {
    pub key_data: Output<String>,
}

/// Linux admin account on every node
#[derive(Debug, Clone)]
pub struct LinuxProfile {
    pub admin_username: String,
    pub ssh_key: SshKey,
}

/// Input pointer of the admin SSH key
const SSH_KEY_POINTER: &str = "/linuxProfile/sshKey/keyData";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    #[serde(rename = "type")]
    pub type_: IdentityType,
}

/// Default node pool; bound to a subnet by id
#[derive(Debug, Clone)]
pub struct DefaultNodePoolArgs {
    pub name: String,
    pub vm_size: String,
    pub node_count: u32,
    pub vnet_subnet_id: Output<String>,
}

impl DefaultNodePoolArgs {
    fn validate(&self) -> std::result::Result<(), String> {
        // Linux pool names: lowercase alphanumerics, starting with a letter, at most 12
        let valid_name = !self.name.is_empty()
            && self.name.len() <= 12
            && self.name.starts_with(|c: char| c.is_ascii_lowercase())
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid_name {
            return Err(format!("invalid node pool name '{}'", self.name));
        }

        if self.vm_size.is_empty() {
            return Err("node pool VM size cannot be empty".to_string());
        }

        if self.node_count == 0 {
            return Err("node pool needs at least one node".to_string());
        }

        Ok(())
    }
}

/// Arguments for a managed Kubernetes cluster
#[derive(Debug, Clone)]
pub struct KubernetesClusterArgs {
    pub name: Option<String>,
    pub resource_group_name: Output<String>,
    pub location: Output<String>,
    pub dns_prefix: String,
    pub default_node_pool: DefaultNodePoolArgs,
    pub linux_profile: LinuxProfile,
    pub network_profile: NetworkProfile,
    pub identity: ClusterIdentity,
}

impl ResourceArgs for KubernetesClusterArgs {
    const TYPE: &'static str = "azure:containerservice/kubernetesCluster:KubernetesCluster";

    fn validate(&self) -> std::result::Result<(), String> {
        if self.dns_prefix.is_empty()
            || !self
                .dns_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(format!("invalid DNS prefix '{}'", self.dns_prefix));
        }

        if self.linux_profile.admin_username.is_empty() {
            return Err("admin username cannot be empty".to_string());
        }

        self.default_node_pool.validate()?;
        self.network_profile.validate()?;

        Ok(())
    }

    fn dependencies(&self) -> BTreeSet<Urn> {
        let mut deps = self.resource_group_name.resources().clone();
        deps.extend(self.location.resources().iter().cloned());
        deps.extend(self.default_node_pool.vnet_subnet_id.resources().iter().cloned());
        deps.extend(self.linux_profile.ssh_key.key_data.resources().iter().cloned());
        deps
    }

    fn secret_inputs(&self) -> BTreeSet<String> {
        if self.linux_profile.ssh_key.key_data.is_secret() {
            [SSH_KEY_POINTER.to_string()].into_iter().collect()
        } else {
            BTreeSet::new()
        }
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            let pool = self.default_node_pool;

            // The key is only known here; never echo it in the error
            let key_data = self.linux_profile.ssh_key.key_data.get().await?;
            check_public_key(&key_data).map_err(|message| {
                Error::validation("linuxProfile.sshKey", message)
            })?;

            let mut inputs = json!({
                "resourceGroupName": self.resource_group_name.get().await?,
                "location": self.location.get().await?,
                "dnsPrefix": self.dns_prefix,
                "defaultNodePool": {
                    "name": pool.name,
                    "vmSize": pool.vm_size,
                    "nodeCount": pool.node_count,
                    "vnetSubnetId": pool.vnet_subnet_id.get().await?,
                },
                "linuxProfile": {
                    "adminUsername": self.linux_profile.admin_username,
                    "sshKey": { "keyData": key_data },
                },
                "networkProfile": self.network_profile,
                "identity": self.identity,
            });
            if let Some(name) = self.name {
                inputs["name"] = json!(name);
            }
            Ok(inputs)
        }
        .boxed()
    }
}

/// A declared managed cluster
#[derive(Debug, Clone)]
pub struct KubernetesCluster {
    resource: CustomResource,
    pub id: Output<String>,
    pub name: Output<String>,
    pub fqdn: Output<String>,
    /// Raw admin kubeconfig (secret)
    pub kube_config_raw: Output<String>,
}

impl KubernetesCluster {
    /// Declare a managed cluster; its kubeconfig output is secret
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: KubernetesClusterArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            id: resource.id(),
            name: resource.output("/name"),
            fqdn: resource.output("/fqdn"),
            // Secret up front so providers built from it mask their inputs
            kube_config_raw: resource.output("/kubeConfigRaw").as_secret(),
            resource,
        })
    }
}

impl Resource for KubernetesCluster {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}
