/// Kubeconfig documents handed out for managed clusters
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Minimal kubeconfig (clusters, users, contexts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub certificate_authority_data: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub token: String,
}

impl Kubeconfig {
    /// Admin kubeconfig for a cluster reachable at `fqdn`
    pub fn generate(cluster_name: &str, fqdn: &str, rng: &mut impl RngCore) -> Self {
        let mut ca = [0u8; 32];
        rng.fill_bytes(&mut ca);
        let mut token = [0u8; 32];
        rng.fill_bytes(&mut token);

        let user = format!("clusterAdmin_{}", cluster_name);

        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: cluster_name.to_string(),
                cluster: ClusterEntry {
                    certificate_authority_data: STANDARD.encode(ca),
                    server: format!("https://{}:443", fqdn),
                },
            }],
            contexts: vec![NamedContext {
                name: cluster_name.to_string(),
                context: ContextEntry {
                    cluster: cluster_name.to_string(),
                    user: user.clone(),
                },
            }],
            current_context: cluster_name.to_string(),
            users: vec![NamedUser {
                name: user,
                user: UserEntry {
                    token: token.iter().map(|b| format!("{:02x}", b)).collect(),
                },
            }],
        }
    }

    /// Parse a kubeconfig document
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// API server of the current context, if it resolves
    pub fn current_server(&self) -> Option<&str> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)?;
        self.clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .map(|c| c.cluster.server.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_kubeconfig_parses_back() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = Kubeconfig::generate("aks-realtime", "realtime-1a2b.hcp.westeurope.azmk8s.io", &mut rng);

        let raw = config.to_yaml().unwrap();
        assert!(raw.contains("current-context: aks-realtime"));
        assert!(raw.contains("certificate-authority-data:"));

        let parsed = Kubeconfig::parse(&raw).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.current_server(),
            Some("https://realtime-1a2b.hcp.westeurope.azmk8s.io:443")
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Kubeconfig::parse("not: [a kubeconfig").is_err());
    }
}
