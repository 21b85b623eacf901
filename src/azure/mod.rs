/// Azure resource declarations
pub mod containerservice;
pub mod core;
pub mod network;

pub use containerservice::KubernetesCluster;
pub use self::core::ResourceGroup;
pub use network::{Subnet, VirtualNetwork};
