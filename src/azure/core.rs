/// Resource groups
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::runtime::{Context, CustomResource, Output, Resource, ResourceArgs, ResourceOptions, Urn};

/// Arguments for an Azure resource group
#[derive(Debug, Clone)]
pub struct ResourceGroupArgs {
    /// Physical name; auto-named from the logical name when unset
    pub name: Option<String>,
    pub location: String,
}

impl ResourceArgs for ResourceGroupArgs {
    const TYPE: &'static str = "azure:core/resourceGroup:ResourceGroup";

    fn validate(&self) -> std::result::Result<(), String> {
        if self.location.is_empty() {
            return Err("location cannot be empty".to_string());
        }
        Ok(())
    }

    fn dependencies(&self) -> BTreeSet<Urn> {
        BTreeSet::new()
    }

    fn resolve(self) -> BoxFuture<'static, Result<serde_json::Value>> {
        async move {
            let mut inputs = json!({ "location": self.location });
            if let Some(name) = self.name {
                inputs["name"] = json!(name);
            }
            Ok(inputs)
        }
        .boxed()
    }
}

/// A declared resource group
#[derive(Debug, Clone)]
pub struct ResourceGroup {
    resource: CustomResource,
    pub id: Output<String>,
    pub name: Output<String>,
    pub location: Output<String>,
}

impl ResourceGroup {
    /// Declare a resource group
    pub fn new(
        ctx: &mut Context,
        name: &str,
        args: ResourceGroupArgs,
        options: ResourceOptions,
    ) -> Result<Self> {
        let resource = ctx.register_resource(name, args, options)?;
        Ok(Self {
            id: resource.id(),
            name: resource.output("/name"),
            location: resource.output("/location"),
            resource,
        })
    }
}

impl Resource for ResourceGroup {
    fn urn(&self) -> &Urn {
        self.resource.urn()
    }
}
