/// Engine seam: where declared resources are submitted for reconciliation
pub mod kubeconfig;
pub mod preview;

pub use preview::{Plan, PreviewEngine, Step};

use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::runtime::Urn;

/// One resource registration, inputs fully resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub urn: Urn,
    #[serde(rename = "type")]
    pub type_token: String,
    pub name: String,
    pub provider: Option<Urn>,
    pub dependencies: Vec<Urn>,
    pub inputs: serde_json::Value,
    /// JSON pointers into `inputs` holding secret values
    pub secret_inputs: BTreeSet<String>,
}

/// What the engine reports back for a registration
#[derive(Debug, Clone)]
pub struct RegisterResponse {
    pub id: String,
    pub outputs: serde_json::Value,
    /// JSON pointers into `outputs` holding secret values
    pub secret_outputs: BTreeSet<String>,
}

/// Runtime that owns desired-state reconciliation
pub trait Engine: Send + Sync {
    fn register(&self, request: RegisterRequest) -> BoxFuture<'static, Result<RegisterResponse>>;
}
