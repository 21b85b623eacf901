/// In-memory engine that plans registrations without touching any cloud
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use super::kubeconfig::Kubeconfig;
use super::{Engine, RegisterRequest, RegisterResponse};
use crate::azure::containerservice::KubernetesClusterArgs;
use crate::azure::core::ResourceGroupArgs;
use crate::azure::network::{SubnetArgs, VirtualNetworkArgs};
use crate::error::{Error, Result};
use crate::k8s::core::NamespaceArgs;
use crate::k8s::provider::ProviderArgs;
use crate::runtime::{package_of, ResourceArgs, RunSummary, Urn};

/// Replacement text for secret values in rendered plans
pub const SECRET_MASK: &str = "[secret]";

/// One planned registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub sequence: usize,
    pub urn: Urn,
    #[serde(rename = "type")]
    pub type_token: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Urn>,
    #[serde(default)]
    pub dependencies: Vec<Urn>,
    pub inputs: Value,
    pub outputs: Value,
    /// JSON pointers (into inputs and outputs) holding secret values
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub secrets: BTreeSet<String>,
}

impl Step {
    /// Copy with every secret value replaced by [`SECRET_MASK`]
    pub fn masked(&self) -> Step {
        let mut step = self.clone();
        for pointer in &self.secrets {
            for bag in [&mut step.inputs, &mut step.outputs] {
                if let Some(value) = bag.pointer_mut(pointer) {
                    *value = Value::String(SECRET_MASK.to_string());
                }
            }
        }
        step
    }
}

/// Serializable record of a preview run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub project: String,
    pub stack: String,
    pub generated_at: DateTime<Utc>,
    pub resources: Vec<Step>,
    pub outputs: BTreeMap<String, Value>,
}

impl Plan {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

struct PreviewState {
    rng: StdRng,
    steps: Vec<Step>,
    physical_ids: HashSet<(String, String)>,
}

/// Engine that records every registration and fabricates provider outputs
#[derive(Clone)]
pub struct PreviewEngine {
    inner: Arc<Mutex<PreviewState>>,
    subscription_id: String,
}

impl PreviewEngine {
    /// Create a preview engine for an Azure subscription
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self::with_rng(subscription_id.into(), StdRng::from_entropy())
    }

    /// Deterministic naming and credentials, for tests
    pub fn with_seed(subscription_id: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(subscription_id.into(), StdRng::seed_from_u64(seed))
    }

    fn with_rng(subscription_id: String, rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PreviewState {
                rng,
                steps: Vec::new(),
                physical_ids: HashSet::new(),
            })),
            subscription_id,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PreviewState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Steps recorded so far, in registration order
    pub fn steps(&self) -> Vec<Step> {
        self.lock().steps.clone()
    }

    pub fn step(&self, urn: &Urn) -> Option<Step> {
        self.lock().steps.iter().find(|s| &s.urn == urn).cloned()
    }

    /// Build the plan for a finished run, secrets masked
    pub fn plan(&self, project: &str, stack: &str, summary: &RunSummary) -> Plan {
        let outputs = summary
            .outputs
            .iter()
            .map(|(name, value)| {
                let value = if summary.secret_outputs.contains(name) {
                    Value::String(SECRET_MASK.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), value)
            })
            .collect();

        Plan {
            project: project.to_string(),
            stack: stack.to_string(),
            generated_at: Utc::now(),
            resources: self.steps().iter().map(Step::masked).collect(),
            outputs,
        }
    }

    /// Plan one registration
    ///
    /// Computes physical id and outputs for the request's package, rejects
    /// physical-id collisions within a type, and records the step.
    fn apply(&self, request: RegisterRequest) -> Result<RegisterResponse> {
        let mut state = self.lock();

        // Type-specific naming and outputs
        let (id, outputs, mut secrets) = match package_of(&request.type_token) {
            "azure" => self.azure_outputs(&mut state.rng, &request)?,
            "kubernetes" if request.type_token == ProviderArgs::TYPE => {
                provider_outputs(&mut state.rng, &request)?
            }
            "kubernetes" => kubernetes_outputs(&mut state.rng, &request)?,
            _ => {
                return Err(Error::engine(
                    request.urn.as_str(),
                    format!("unsupported resource type {}", request.type_token),
                ))
            }
        };
        secrets.extend(request.secret_inputs.iter().cloned());

        // Physical ids are unique per type
        if !state
            .physical_ids
            .insert((request.type_token.clone(), id.clone()))
        {
            return Err(Error::engine(
                request.urn.as_str(),
                format!("{} '{}' already exists", request.type_token, id),
            ));
        }

        let sequence = state.steps.len() + 1;
        info!("+ {} {} (id: {})", request.type_token, request.name, id);

        state.steps.push(Step {
            sequence,
            urn: request.urn,
            type_token: request.type_token,
            id: id.clone(),
            provider: request.provider,
            dependencies: request.dependencies,
            inputs: request.inputs,
            outputs: outputs.clone(),
            secrets: secrets.clone(),
        });

        Ok(RegisterResponse {
            id,
            outputs,
            secret_outputs: secrets,
        })
    }

    /// Azure resources: auto-name, build the ARM id and computed outputs
    ///
    /// Managed clusters also get an FQDN and a generated admin kubeconfig,
    /// reported as a secret output.
    fn azure_outputs(
        &self,
        rng: &mut StdRng,
        request: &RegisterRequest,
    ) -> Result<(String, Value, BTreeSet<String>)> {
        let mut outputs = input_object(request)?;
        let mut secrets = BTreeSet::new();

        let name = match outputs.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => format!("{}{:07x}", request.name, rng.gen::<u32>() & 0x0fff_ffff),
        };
        let subscription = format!("/subscriptions/{}", self.subscription_id);

        let id = match request.type_token.as_str() {
            t if t == ResourceGroupArgs::TYPE => format!("{}/resourceGroups/{}", subscription, name),
            t if t == VirtualNetworkArgs::TYPE => {
                let rg = string_at(request, "/resourceGroupName")?;
                outputs.insert("guid".to_string(), Value::String(random_guid(rng)));
                format!(
                    "{}/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}",
                    subscription, rg, name
                )
            }
            t if t == SubnetArgs::TYPE => {
                let rg = string_at(request, "/resourceGroupName")?;
                let vnet = string_at(request, "/virtualNetworkName")?;
                format!(
                    "{}/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
                    subscription, rg, vnet, name
                )
            }
            t if t == KubernetesClusterArgs::TYPE => {
                let rg = string_at(request, "/resourceGroupName")?;
                let location = string_at(request, "/location")?;
                let dns_prefix = string_at(request, "/dnsPrefix")?;

                let fqdn = format!(
                    "{}-{:08x}.hcp.{}.azmk8s.io",
                    dns_prefix,
                    rng.gen::<u32>(),
                    location
                );
                let kubeconfig = Kubeconfig::generate(&name, &fqdn, rng).to_yaml()?;

                outputs.insert("fqdn".to_string(), Value::String(fqdn));
                outputs.insert("kubeConfigRaw".to_string(), Value::String(kubeconfig));
                outputs.insert(
                    "nodeResourceGroup".to_string(),
                    Value::String(format!("MC_{}_{}_{}", rg, name, location)),
                );
                secrets.insert("/kubeConfigRaw".to_string());

                format!(
                    "{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}",
                    subscription, rg, name
                )
            }
            other => {
                return Err(Error::engine(
                    request.urn.as_str(),
                    format!("unsupported resource type {}", other),
                ))
            }
        };

        outputs.insert("name".to_string(), Value::String(name));
        outputs.insert("id".to_string(), Value::String(id.clone()));

        Ok((id, Value::Object(outputs), secrets))
    }
}

impl Engine for PreviewEngine {
    fn register(&self, request: RegisterRequest) -> BoxFuture<'static, Result<RegisterResponse>> {
        let engine = self.clone();
        async move { engine.apply(request) }.boxed()
    }
}

/// Kubernetes provider: the kubeconfig must resolve to an API server
fn provider_outputs(
    rng: &mut StdRng,
    request: &RegisterRequest,
) -> Result<(String, Value, BTreeSet<String>)> {
    let mut outputs = input_object(request)?;
    let raw = string_at(request, "/kubeconfig")?;

    let kubeconfig = Kubeconfig::parse(&raw).map_err(|e| {
        Error::engine(request.urn.as_str(), format!("invalid kubeconfig: {}", e))
    })?;
    let server = kubeconfig.current_server().ok_or_else(|| {
        Error::engine(
            request.urn.as_str(),
            "kubeconfig current context does not resolve to a cluster",
        )
    })?;
    outputs.insert("server".to_string(), Value::String(server.to_string()));

    Ok((random_guid(rng), Value::Object(outputs), BTreeSet::new()))
}

/// Kubernetes objects: need a provider, get auto-named and defaulted into
/// the "default" namespace
fn kubernetes_outputs(
    rng: &mut StdRng,
    request: &RegisterRequest,
) -> Result<(String, Value, BTreeSet<String>)> {
    if request.provider.is_none() {
        return Err(Error::engine(
            request.urn.as_str(),
            "no kubernetes provider configured",
        ));
    }

    let mut outputs = input_object(request)?;
    let mut metadata = match outputs.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        None => Map::new(),
        Some(_) => {
            return Err(Error::engine(
                request.urn.as_str(),
                "metadata must be an object",
            ))
        }
    };

    let name = match metadata.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => format!("{}-{:08x}", request.name, rng.gen::<u32>()),
    };
    metadata.insert("name".to_string(), Value::String(name.clone()));

    let id = if request.type_token == NamespaceArgs::TYPE {
        name
    } else {
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        metadata.insert("namespace".to_string(), Value::String(namespace.clone()));
        format!("{}/{}", namespace, name)
    };

    outputs.insert("metadata".to_string(), Value::Object(metadata));

    Ok((id, Value::Object(outputs), BTreeSet::new()))
}

fn input_object(request: &RegisterRequest) -> Result<Map<String, Value>> {
    match &request.inputs {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::engine(
            request.urn.as_str(),
            "inputs must be an object",
        )),
    }
}

fn string_at(request: &RegisterRequest, pointer: &str) -> Result<String> {
    request
        .inputs
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::engine(
                request.urn.as_str(),
                format!("missing string input {}", pointer),
            )
        })
}

/// Random RFC 4122 shaped identifier
fn random_guid(rng: &mut StdRng) -> String {
    let bytes: [u8; 16] = rng.gen();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(type_token: &str, name: &str, inputs: Value) -> RegisterRequest {
        RegisterRequest {
            urn: Urn::new("dev", "realtime", type_token, name),
            type_token: type_token.to_string(),
            name: name.to_string(),
            provider: None,
            dependencies: Vec::new(),
            inputs,
            secret_inputs: BTreeSet::new(),
        }
    }

    fn engine() -> PreviewEngine {
        PreviewEngine::with_seed("sub-123", 42)
    }

    #[test]
    fn test_resource_group_autonaming() {
        let engine = engine();
        let response = engine
            .apply(request(
                ResourceGroupArgs::TYPE,
                "rg-aks",
                json!({ "location": "westeurope" }),
            ))
            .unwrap();

        let name = response.outputs["name"].as_str().unwrap();
        assert!(name.starts_with("rg-aks"));
        assert_eq!(name.len(), "rg-aks".len() + 7);
        assert_eq!(
            response.id,
            format!("/subscriptions/sub-123/resourceGroups/{}", name)
        );
    }

    #[test]
    fn test_explicit_name_is_kept() {
        let engine = engine();
        let response = engine
            .apply(request(
                ResourceGroupArgs::TYPE,
                "rg",
                json!({ "name": "rg-fixed", "location": "westeurope" }),
            ))
            .unwrap();
        assert_eq!(response.outputs["name"], "rg-fixed");
    }

    #[test]
    fn test_cluster_outputs_are_secret() {
        let engine = engine();
        let response = engine
            .apply(request(
                KubernetesClusterArgs::TYPE,
                "aks",
                json!({
                    "resourceGroupName": "rg",
                    "location": "westeurope",
                    "dnsPrefix": "realtime",
                }),
            ))
            .unwrap();

        let raw = response.outputs["kubeConfigRaw"].as_str().unwrap();
        let kubeconfig = Kubeconfig::parse(raw).unwrap();
        assert!(kubeconfig
            .current_server()
            .unwrap()
            .contains(".hcp.westeurope.azmk8s.io"));
        assert!(response.secret_outputs.contains("/kubeConfigRaw"));

        let masked = engine.steps()[0].masked();
        assert_eq!(masked.outputs["kubeConfigRaw"], SECRET_MASK);
    }

    #[test]
    fn test_kubernetes_resources_need_provider() {
        let engine = engine();
        let err = engine
            .apply(request(NamespaceArgs::TYPE, "realtime", json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
    }

    #[test]
    fn test_kubernetes_namespace_defaults() {
        let engine = engine();
        let mut req = request(
            "kubernetes:apps/v1:Deployment",
            "redisapp",
            json!({ "metadata": {}, "spec": {} }),
        );
        req.provider = Some(Urn::new("dev", "realtime", ProviderArgs::TYPE, "k8s"));

        let response = engine.apply(req).unwrap();
        assert_eq!(response.outputs["metadata"]["namespace"], "default");
        assert!(response.id.starts_with("default/redisapp-"));
    }

    #[test]
    fn test_physical_name_collision() {
        let engine = engine();
        let inputs = json!({ "name": "rg-fixed", "location": "westeurope" });
        engine
            .apply(request(ResourceGroupArgs::TYPE, "a", inputs.clone()))
            .unwrap();
        let err = engine
            .apply(request(ResourceGroupArgs::TYPE, "b", inputs))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(engine.steps().len(), 1);
    }

    #[test]
    fn test_provider_rejects_bad_kubeconfig() {
        let engine = engine();
        let err = engine
            .apply(request(
                ProviderArgs::TYPE,
                "k8s",
                json!({ "kubeconfig": "::not yaml::[" }),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("invalid kubeconfig"));
    }

    #[test]
    fn test_unsupported_type() {
        let engine = engine();
        assert!(engine
            .apply(request("aws:s3/bucket:Bucket", "b", json!({})))
            .is_err());
    }

    #[test]
    fn test_seeded_engines_agree() {
        let a = engine();
        let b = engine();
        let req = || request(ResourceGroupArgs::TYPE, "rg", json!({ "location": "westeurope" }));
        assert_eq!(a.apply(req()).unwrap().id, b.apply(req()).unwrap().id);
    }

    #[test]
    fn test_random_guid_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let guid = random_guid(&mut rng);
        let parts: Vec<usize> = guid.split('-').map(str::len).collect();
        assert_eq!(parts, vec![8, 4, 4, 4, 12]);
    }
}
