/// Object metadata shared by all Kubernetes resources
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::runtime::{Output, Urn};

/// Resolved object metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Metadata as declared; the namespace usually comes from a Namespace output
#[derive(Debug, Clone, Default)]
pub struct ObjectMetaArgs {
    /// Physical name; auto-named from the logical name when unset
    pub name: Option<String>,
    pub namespace: Option<Output<String>>,
    pub labels: BTreeMap<String, String>,
}

impl ObjectMetaArgs {
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if let Some(name) = &self.name {
            if !is_dns_label(name) {
                return Err(format!("'{}' is not a valid DNS-1123 label", name));
            }
        }
        Ok(())
    }

    pub(crate) fn dependencies(&self) -> BTreeSet<Urn> {
        self.namespace
            .as_ref()
            .map(|ns| ns.resources().clone())
            .unwrap_or_default()
    }

    pub(crate) async fn resolve(self) -> Result<ObjectMeta> {
        let namespace = match self.namespace {
            Some(ns) => Some(ns.get().await?),
            None => None,
        };
        Ok(ObjectMeta {
            name: self.name,
            namespace,
            labels: self.labels,
        })
    }
}

/// Label query over pods
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

/// Build a label map from pairs
pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// RFC 1123 label: at most 63 lowercase alphanumerics or '-', alphanumeric at both ends
pub fn is_dns_label(s: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !s.is_empty()
        && s.len() <= 63
        && s.starts_with(alnum)
        && s.ends_with(alnum)
        && s.chars().all(|c| alnum(c) || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_labels() {
        assert!(is_dns_label("realtime"));
        assert!(is_dns_label("redis-app1"));
        assert!(!is_dns_label("Realtime"));
        assert!(!is_dns_label("-redis"));
        assert!(!is_dns_label("redis-"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[tokio::test]
    async fn test_resolve_namespace_output() {
        let meta = ObjectMetaArgs {
            name: Some("redisapp".to_string()),
            namespace: Some("realtime".into()),
            labels: labels(&[("app", "redisapp")]),
        };
        assert!(meta.validate().is_ok());

        let resolved = meta.resolve().await.unwrap();
        assert_eq!(resolved.namespace.as_deref(), Some("realtime"));
        assert_eq!(resolved.labels["app"], "redisapp");
    }

    #[test]
    fn test_empty_labels_are_skipped() {
        let meta = ObjectMeta {
            name: Some("realtime".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("labels").is_none());
        assert!(value.get("namespace").is_none());
    }
}
