/// aks-realtime - declare an AKS cluster running a redis-backed realtime app
///
/// The runtime (`Context`, `Output`, the resource graph), the Azure and
/// Kubernetes resource SDKs and the preview engine live here; the binary in
/// `main.rs` only wires them to the command line.
pub mod azure;
pub mod config;
pub mod engine;
pub mod error;
pub mod k8s;
pub mod runtime;
pub mod topology;
pub mod utils;
