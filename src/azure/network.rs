/// Virtual networks and subnets
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::runtime::{Context, CustomResource, Output, Resource, ResourceArgs, ResourceOptions, Urn};
use crate::utils::cidr::Ipv4Cidr;

/// Arguments for a virtual network
#[derive(Debug, Clone)]
pub struct VirtualNetworkArgs {
    pub name: Option<String>,
    pub resource_group_name: Output<String>,
    pub location: Output<String>,
    /// Address spaces in CIDR notation (e.g., "10.10.0.0/16")
    pub address_spaces: Vec<String>,
}

impl ResourceArgs for VirtualNetworkArgs {
    const TYPE: &'static str = "azure:network/virtualNetwork:VirtualNetwork";

    fn validate(&self) -> std::result::Result<(), String> {
        if self.address_spaces.is_empty() {
            return Err("at least one address space is required".to_string());
        }

        let spaces = self
            .address_spaces
            .iter()
            .map(|s| s.parse::<Ipv4Cidr>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (i, a) in spaces.iter().enumerate() {
            if let Some(b) = spaces[i + 1..].iter().find(|b| a.overlaps(b)) {
                return Err(format!("address spaces {} and {} overlap", a, b));
            }
        }

        Ok(())
    }

    fn dependencies(&self) -> BTreeSet<Urn> {
        let mut deps = self.resource_group_name.resources().clone();
        deps.extend(self.location.resources().iter().cloned());
        deps
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            let mut inputs = json!({
                "resourceGroupName": self.resource_group_name.get().await?,
                "location": self.location.get().await?,
                "addressSpaces": self.address_spaces,
            });
            if let Some(name) = self.name {
                inputs["name"] = json!(name);
            }
            Ok(inputs)
        }
        .boxed()
    }
}

/// A declared virtual network
#[derive(Debug, Clone)]
pub struct VirtualNetwork {
    resource: CustomResource,
    pub id: Output<String>,
    pub name: Output<String>,
    pub guid: Output<String>,
}

impl VirtualNetwork {
    /// Declare a virtual network
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: VirtualNetworkArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            id: resource.id(),
            name: resource.output("/name"),
            guid: resource.output("/guid"),
            resource,
        })
    }
}

impl Resource for VirtualNetwork {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}

/// Arguments for a subnet inside a virtual network
#[derive(Debug, Clone)]
pub struct SubnetArgs {
    pub name: Option<String>,
    pub resource_group_name: Output<String>,
    pub virtual_network_name: Output<String>,
    /// Address prefix in CIDR notation (e.g., "10.10.0.0/24")
    pub address_prefix: String,
}

impl ResourceArgs for SubnetArgs {
    const TYPE: &'static str = "azure:network/subnet:Subnet";

    fn validate(&self) -> std::result::Result<(), String> {
        self.address_prefix.parse::<Ipv4Cidr>().map(|_| ())
    }

    fn dependencies(&self) -> BTreeSet<Urn> {
        let mut deps = self.resource_group_name.resources().clone();
        deps.extend(self.virtual_network_name.resources().iter().cloned());
        deps
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            let mut inputs = json!({
                "resourceGroupName": self.resource_group_name.get().await?,
                "virtualNetworkName": self.virtual_network_name.get().await?,
                "addressPrefix": self.address_prefix,
            });
            if let Some(name) = self.name {
                inputs["name"] = json!(name);
            }
            Ok(inputs)
        }
        .boxed()
    }
}

/// A declared subnet
#[derive(Debug, Clone)]
pub struct Subnet {
    resource: CustomResource,
    pub id: Output<String>,
    pub name: Output<String>,
}

impl Subnet {
    /// Declare a subnet inside a virtual network
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: SubnetArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            id: resource.id(),
            name: resource.output("/name"),
            resource,
        })
    }
}

impl Resource for Subnet {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vnet_args(spaces: &[&str]) -> VirtualNetworkArgs {
        VirtualNetworkArgs {
            name: None,
            resource_group_name: "rg".into(),
            location: "westeurope".into(),
            address_spaces: spaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_address_space_validation() {
        assert!(vnet_args(&["10.10.0.0/16"]).validate().is_ok());
        assert!(vnet_args(&[]).validate().is_err());
        assert!(vnet_args(&["10.10.0.0"]).validate().is_err());
        assert!(vnet_args(&["10.10.0.0/16", "10.10.4.0/24"]).validate().is_err());
        assert!(vnet_args(&["10.10.0.0/16", "10.20.0.0/16"]).validate().is_ok());
    }

    #[test]
    fn test_subnet_prefix_validation() {
        let mut args = SubnetArgs {
            name: None,
            resource_group_name: "rg".into(),
            virtual_network_name: "vnet".into(),
            address_prefix: "10.10.0.0/24".to_string(),
        };
        assert!(args.validate().is_ok());

        args.address_prefix = "10.10.0.0/40".to_string();
        assert!(args.validate().is_err());
    }

    #[tokio::test]
    async fn test_subnet_resolve() {
        let args = SubnetArgs {
            name: None,
            resource_group_name: "rg".into(),
            virtual_network_name: "vnet".into(),
            address_prefix: "10.10.0.0/24".to_string(),
        };
        assert!(args.dependencies().is_empty());

        let inputs = args.resolve().await.unwrap();
        assert_eq!(inputs["virtualNetworkName"], "vnet");
        assert_eq!(inputs["addressPrefix"], "10.10.0.0/24");
        assert!(inputs.get("name").is_none());
    }
}
