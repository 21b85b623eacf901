/// Kubernetes resource declarations
pub mod apps;
pub mod core;
pub mod manifest;
pub mod meta;
pub mod provider;

pub use self::core::{Namespace, Service};
pub use apps::Deployment;
pub use provider::Provider;
