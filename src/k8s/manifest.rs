/// Render planned Kubernetes resources as plain manifests
use serde_json::{Map, Value};

use crate::engine::Step;
use crate::error::{Error, Result};
use crate::runtime::{is_provider_type, package_of};

/// apiVersion and kind for a type token ("kubernetes:apps/v1:Deployment" -> ("apps/v1", "Deployment"))
///
/// The core group has no prefix ("kubernetes:core/v1:Service" -> "v1").
pub fn api_version_and_kind(type_token: &str) -> Option<(String, String)> {
    let mut parts = type_token.splitn(3, ':');
    if parts.next()? != "kubernetes" {
        return None;
    }
    let (group, version) = parts.next()?.split_once('/')?;
    let kind = parts.next()?;

    let api_version = if group == "core" {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    };
    Some((api_version, kind.to_string()))
}

/// Multi-document YAML for every Kubernetes step, in registration order
pub fn render(steps: &[Step]) -> Result<String> {
    let mut documents = Vec::new();

    for step in steps {
        if package_of(&step.type_token) != "kubernetes" || is_provider_type(&step.type_token) {
            continue;
        }

        let (api_version, kind) = api_version_and_kind(&step.type_token).ok_or_else(|| {
            Error::Serialization(format!("cannot map {} to a Kubernetes kind", step.type_token))
        })?;

        let mut object = Map::new();
        object.insert("apiVersion".to_string(), Value::String(api_version));
        object.insert("kind".to_string(), Value::String(kind));
        for field in ["metadata", "spec"] {
            if let Some(value) = step.outputs.get(field) {
                object.insert(field.to_string(), value.clone());
            }
        }

        documents.push(serde_yaml::to_string(&Value::Object(object))?);
    }

    Ok(documents.join("---\n"))
}
