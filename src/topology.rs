/// The realtime stack: AKS cluster, its network, and the redis-backed app
use std::net::Ipv4Addr;
use tracing::info;

use crate::azure::containerservice::{
    ClusterIdentity, DefaultNodePoolArgs, IdentityType, KubernetesClusterArgs, LinuxProfile,
    NetworkPlugin, NetworkProfile, SshKey,
};
use crate::azure::core::ResourceGroupArgs;
use crate::azure::network::{SubnetArgs, VirtualNetworkArgs};
use crate::azure::{KubernetesCluster, ResourceGroup, Subnet, VirtualNetwork};
use crate::error::{Error, Result};
use crate::k8s::apps::{DeploymentArgs, DeploymentSpec};
use crate::k8s::core::{
    Container, ContainerPort, EnvVar, NamespaceArgs, PodSpec, PodTemplateSpec, ServiceArgs,
    ServicePort, ServiceSpec, ServiceType,
};
use crate::k8s::meta::{labels, LabelSelector, ObjectMeta, ObjectMetaArgs};
use crate::k8s::provider::ProviderArgs;
use crate::k8s::{Deployment, Namespace, Provider, Service};
use crate::runtime::{Context, ResourceOptions};
use crate::utils::cidr::Ipv4Cidr;

pub const LOCATION: &str = "westeurope";
pub const VNET_CIDR: &str = "10.10.0.0/16";
pub const SUBNET_CIDR: &str = "10.10.0.0/24";
pub const DNS_SERVICE_IP: &str = "10.10.1.254";
pub const SERVICE_CIDR: &str = "10.10.1.0/24";
pub const DOCKER_BRIDGE_CIDR: &str = "172.17.0.1/16";
pub const NODE_VM_SIZE: &str = "Standard_DS2_v2";
pub const NODE_COUNT: u32 = 2;
pub const ADMIN_USERNAME: &str = "cluadmin";
pub const NAMESPACE: &str = "realtime";

pub const REDIS_NAME: &str = "redisapp";
pub const REDIS_IMAGE: &str = "redis:4-32bit";
pub const REDIS_PORT: u16 = 6379;

pub const APP_NAME: &str = "realtimeapp";
pub const APP_IMAGE: &str = "gbaeke/fluxapp:1.0.0";
pub const APP_PORT: u16 = 8080;
pub const APP_REPLICAS: i32 = 3;
pub const APP_PUBLIC_PORT: u16 = 80;

/// Stack output carrying the raw admin kubeconfig
pub const KUBECONFIG_OUTPUT: &str = "kubeconfig";

/// Config key holding the admin SSH public key
pub const SSH_KEY_CONFIG: &str = "sshkey";

/// Handles to everything the stack declares
#[derive(Debug, Clone)]
pub struct Topology {
    pub resource_group: ResourceGroup,
    pub vnet: VirtualNetwork,
    pub subnet: Subnet,
    pub cluster: KubernetesCluster,
    pub provider: Provider,
    pub namespace: Namespace,
    pub redis_deployment: Deployment,
    pub redis_service: Service,
    pub app_deployment: Deployment,
    pub app_service: Service,
}

/// In-cluster address the app uses to reach redis
pub fn redis_host() -> String {
    format!("{}.{}:{}", REDIS_NAME, NAMESPACE, REDIS_PORT)
}

/// Check that the fixed network literals fit together
pub fn check_address_plan() -> Result<()> {
    let invalid = |message: String| Error::validation("address plan", message);

    let vnet: Ipv4Cidr = VNET_CIDR.parse().map_err(invalid)?;
    let subnet: Ipv4Cidr = SUBNET_CIDR.parse().map_err(invalid)?;
    let services: Ipv4Cidr = SERVICE_CIDR.parse().map_err(invalid)?;
    let dns_ip: Ipv4Addr = DNS_SERVICE_IP
        .parse()
        .map_err(|_| invalid(format!("invalid DNS service IP {}", DNS_SERVICE_IP)))?;

    if !vnet.contains(&subnet) {
        return Err(invalid(format!("subnet {} is outside network {}", subnet, vnet)));
    }
    if services.overlaps(&subnet) {
        return Err(invalid(format!(
            "service CIDR {} overlaps subnet {}",
            services, subnet
        )));
    }
    if !services.contains_addr(dns_ip) {
        return Err(invalid(format!(
            "DNS service IP {} is outside service CIDR {}",
            dns_ip, services
        )));
    }

    Ok(())
}

/// Declare the whole stack, stopping at the first error
pub fn declare(ctx: &mut Context) -> Result<Topology> {
    // The admin key is secret: it must never show up in a rendered plan
    let ssh_key = ctx.config(ctx.project()).require_secret(SSH_KEY_CONFIG)?;
    check_address_plan()?;

    info!("Declaring realtime stack in {}", LOCATION);

    let resource_group = ResourceGroup::new(
        ctx,
        "rg-aks-realtime",
        ResourceGroupArgs {
            name: None,
            location: LOCATION.to_string(),
        },
        ResourceOptions::new(),
    )?;

    let vnet = VirtualNetwork::new(
        ctx,
        "vnet-realtime",
        VirtualNetworkArgs {
            name: None,
            resource_group_name: resource_group.name.clone(),
            location: resource_group.location.clone(),
            address_spaces: vec![VNET_CIDR.to_string()],
        },
        ResourceOptions::new(),
    )?;

    let subnet = Subnet::new(
        ctx,
        "aks",
        SubnetArgs {
            name: None,
            resource_group_name: resource_group.name.clone(),
            virtual_network_name: vnet.name.clone(),
            address_prefix: SUBNET_CIDR.to_string(),
        },
        ResourceOptions::new(),
    )?;

    let cluster = KubernetesCluster::new(
        ctx,
        "aks-realtime",
        KubernetesClusterArgs {
            name: None,
            resource_group_name: resource_group.name.clone(),
            location: resource_group.location.clone(),
            dns_prefix: "realtime".to_string(),
            default_node_pool: DefaultNodePoolArgs {
                name: "realtime".to_string(),
                vm_size: NODE_VM_SIZE.to_string(),
                node_count: NODE_COUNT,
                vnet_subnet_id: subnet.id.clone(),
            },
            linux_profile: LinuxProfile {
                admin_username: ADMIN_USERNAME.to_string(),
                ssh_key: SshKey { key_data: ssh_key },
            },
            network_profile: NetworkProfile {
                network_plugin: NetworkPlugin::Azure,
                dns_service_ip: DNS_SERVICE_IP.to_string(),
                service_cidr: SERVICE_CIDR.to_string(),
                docker_bridge_cidr: DOCKER_BRIDGE_CIDR.to_string(),
            },
            identity: ClusterIdentity {
                type_: IdentityType::SystemAssigned,
            },
        },
        ResourceOptions::new().depends_on(&subnet),
    )?;

    ctx.export(KUBECONFIG_OUTPUT, cluster.kube_config_raw.clone())?;

    let provider = Provider::new(
        ctx,
        "k8sprovider",
        ProviderArgs {
            kubeconfig: cluster.kube_config_raw.clone(),
        },
        ResourceOptions::new().depends_on(&cluster),
    )?;

    let namespace = Namespace::new(
        ctx,
        NAMESPACE,
        NamespaceArgs {
            metadata: ObjectMetaArgs {
                name: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
        },
        ResourceOptions::new().provider(&provider),
    )?;

    let redis_labels = labels(&[("app", REDIS_NAME)]);

    let redis_deployment = Deployment::new(
        ctx,
        REDIS_NAME,
        DeploymentArgs {
            metadata: ObjectMetaArgs {
                namespace: Some(namespace.name()),
                ..Default::default()
            },
            spec: DeploymentSpec {
                replicas: 1,
                selector: LabelSelector {
                    match_labels: redis_labels.clone(),
                },
                template: PodTemplateSpec {
                    metadata: ObjectMeta {
                        labels: redis_labels.clone(),
                        ..Default::default()
                    },
                    spec: PodSpec {
                        containers: vec![Container {
                            name: REDIS_NAME.to_string(),
                            image: REDIS_IMAGE.to_string(),
                            ports: vec![ContainerPort {
                                container_port: REDIS_PORT,
                            }],
                            env: Vec::new(),
                        }],
                    },
                },
            },
        },
        ResourceOptions::new().provider(&provider),
    )?;

    let redis_service = Service::new(
        ctx,
        REDIS_NAME,
        ServiceArgs {
            metadata: ObjectMetaArgs {
                name: Some(REDIS_NAME.to_string()),
                namespace: Some(namespace.name()),
                labels: redis_labels.clone(),
            },
            spec: ServiceSpec {
                ports: vec![ServicePort {
                    port: REDIS_PORT,
                    target_port: REDIS_PORT,
                }],
                selector: redis_labels,
                type_: ServiceType::ClusterIP,
            },
        },
        ResourceOptions::new()
            .provider(&provider)
            .depends_on(&redis_deployment),
    )?;

    let app_labels = labels(&[("app", APP_NAME)]);

    let app_deployment = Deployment::new(
        ctx,
        APP_NAME,
        DeploymentArgs {
            metadata: ObjectMetaArgs {
                namespace: Some(namespace.name()),
                ..Default::default()
            },
            spec: DeploymentSpec {
                replicas: APP_REPLICAS,
                selector: LabelSelector {
                    match_labels: app_labels.clone(),
                },
                template: PodTemplateSpec {
                    metadata: ObjectMeta {
                        labels: app_labels.clone(),
                        ..Default::default()
                    },
                    spec: PodSpec {
                        containers: vec![Container {
                            name: APP_NAME.to_string(),
                            image: APP_IMAGE.to_string(),
                            ports: vec![ContainerPort {
                                container_port: APP_PORT,
                            }],
                            env: vec![EnvVar {
                                name: "REDISHOST".to_string(),
                                value: redis_host(),
                            }],
                        }],
                    },
                },
            },
        },
        ResourceOptions::new()
            .provider(&provider)
            .depends_on(&redis_service),
    )?;

    let app_service = Service::new(
        ctx,
        APP_NAME,
        ServiceArgs {
            metadata: ObjectMetaArgs {
                namespace: Some(namespace.name()),
                labels: app_labels.clone(),
                ..Default::default()
            },
            spec: ServiceSpec {
                ports: vec![ServicePort {
                    port: APP_PUBLIC_PORT,
                    target_port: APP_PORT,
                }],
                selector: app_labels,
                type_: ServiceType::LoadBalancer,
            },
        },
        ResourceOptions::new()
            .provider(&provider)
            .depends_on(&app_deployment),
    )?;

    info!("Declared {} resources", ctx.graph().len());

    Ok(Topology {
        resource_group,
        vnet,
        subnet,
        cluster,
        provider,
        namespace,
        redis_deployment,
        redis_service,
        app_deployment,
        app_service,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::engine::kubeconfig::Kubeconfig;
    use crate::engine::{PreviewEngine, Step};
    use crate::runtime::{Resource, ResourceArgs, ResourceGraph, RunSummary, Urn};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const TEST_KEY: &str = "ssh-rsa AAAA...test";

    fn stack(ssh_key: Option<&str>) -> StackConfig {
        // unique project so a REALTIME_SSHKEY in the environment cannot leak in
        let config = StackConfig::new("realtimetest", "dev");
        match ssh_key {
            Some(key) => config.with_value("realtimetest:sshkey", key),
            None => config,
        }
    }

    fn context(ssh_key: Option<&str>, seed: u64) -> (Context, PreviewEngine) {
        let engine = PreviewEngine::with_seed("00000000-0000-0000-0000-000000000000", seed);
        let ctx = Context::new(stack(ssh_key), Arc::new(engine.clone()));
        (ctx, engine)
    }

    async fn run(ssh_key: &str, seed: u64) -> (Topology, RunSummary, PreviewEngine) {
        let (mut ctx, engine) = context(Some(ssh_key), seed);
        let topology = declare(&mut ctx).unwrap();
        let summary = ctx.finish().await.unwrap();
        (topology, summary, engine)
    }

    fn step_for(engine: &PreviewEngine, resource: &impl Resource) -> Step {
        engine.step(resource.urn()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_ssh_key_declares_nothing() {
        let (mut ctx, engine) = context(None, 1);

        let err = declare(&mut ctx).unwrap_err();
        assert_eq!(err, Error::MissingConfig("realtimetest:sshkey".to_string()));
        assert!(ctx.graph().is_empty());
        assert_eq!(ctx.export_names().count(), 0);

        let summary = ctx.finish().await.unwrap();
        assert!(summary.resources.is_empty());
        assert!(engine.steps().is_empty());
    }

    fn deps(graph: &ResourceGraph, resource: &dyn Resource) -> BTreeSet<Urn> {
        graph.get(resource.urn()).unwrap().dependencies.clone()
    }

    fn urns(resources: &[&dyn Resource]) -> BTreeSet<Urn> {
        resources.iter().map(|r| r.urn().clone()).collect()
    }

    #[test]
    fn test_graph_shape() {
        let (mut ctx, _) = context(Some(TEST_KEY), 1);
        let t = declare(&mut ctx).unwrap();
        let graph = ctx.graph();

        assert_eq!(graph.len(), 10);
        assert!(graph.is_acyclic());
        assert_eq!(ctx.export_names().collect::<Vec<_>>(), vec![KUBECONFIG_OUTPUT]);

        assert!(deps(graph, &t.resource_group).is_empty());
        assert_eq!(deps(graph, &t.vnet), urns(&[&t.resource_group]));
        assert_eq!(deps(graph, &t.subnet), urns(&[&t.resource_group, &t.vnet]));
        assert_eq!(deps(graph, &t.cluster), urns(&[&t.resource_group, &t.subnet]));
        assert_eq!(deps(graph, &t.provider), urns(&[&t.cluster]));
        assert_eq!(deps(graph, &t.namespace), urns(&[&t.provider]));
        assert_eq!(
            deps(graph, &t.redis_deployment),
            urns(&[&t.provider, &t.namespace])
        );
        assert_eq!(
            deps(graph, &t.redis_service),
            urns(&[&t.provider, &t.namespace, &t.redis_deployment])
        );
        assert_eq!(
            deps(graph, &t.app_deployment),
            urns(&[&t.provider, &t.namespace, &t.redis_service])
        );
        assert_eq!(
            deps(graph, &t.app_service),
            urns(&[&t.provider, &t.namespace, &t.app_deployment])
        );

        let k8s_resources: [&dyn Resource; 5] = [
            &t.namespace,
            &t.redis_deployment,
            &t.redis_service,
            &t.app_deployment,
            &t.app_service,
        ];
        for r in k8s_resources {
            let node = graph.get(r.urn()).unwrap();
            assert_eq!(node.provider.as_ref(), Some(t.provider.urn()));
        }
    }

    #[tokio::test]
    async fn test_engine_order_respects_dependencies() {
        let (_, _, engine) = run(TEST_KEY, 2).await;
        let steps = engine.steps();
        assert_eq!(steps.len(), 10);

        for (position, step) in steps.iter().enumerate() {
            for dep in &step.dependencies {
                let dep_position = steps.iter().position(|s| &s.urn == dep).unwrap();
                assert!(
                    dep_position < position,
                    "{} registered before its dependency {}",
                    step.urn,
                    dep
                );
            }
        }
    }

    #[tokio::test]
    async fn test_service_types_are_not_swapped() {
        let (t, _, _) = run(TEST_KEY, 3).await;
        let redis = t.redis_service.spec.get().await.unwrap();
        let app = t.app_service.spec.get().await.unwrap();

        assert_eq!(redis.type_, ServiceType::ClusterIP);
        assert_eq!(app.type_, ServiceType::LoadBalancer);
        assert_eq!(app.ports[0].port, 80);
        assert_eq!(app.ports[0].target_port, 8080);
    }

    #[tokio::test]
    async fn test_end_to_end_preview() {
        let (t, summary, engine) = run(TEST_KEY, 4).await;
        assert_eq!(summary.resources.len(), 10);

        let rg = step_for(&engine, &t.resource_group);
        assert_eq!(rg.outputs["location"], "westeurope");

        let vnet = step_for(&engine, &t.vnet);
        assert_eq!(vnet.inputs["addressSpaces"][0], "10.10.0.0/16");
        assert_eq!(vnet.inputs["resourceGroupName"], rg.outputs["name"]);

        let subnet = step_for(&engine, &t.subnet);
        assert_eq!(subnet.inputs["addressPrefix"], "10.10.0.0/24");
        assert_eq!(subnet.inputs["virtualNetworkName"], vnet.outputs["name"]);

        let cluster = step_for(&engine, &t.cluster);
        assert_eq!(cluster.inputs["defaultNodePool"]["nodeCount"], 2);
        assert_eq!(cluster.inputs["defaultNodePool"]["vmSize"], "Standard_DS2_v2");
        assert_eq!(cluster.inputs["defaultNodePool"]["vnetSubnetId"], subnet.id.as_str());
        assert_eq!(cluster.inputs["linuxProfile"]["adminUsername"], "cluadmin");

        let ns = t.namespace.metadata.get().await.unwrap();
        assert_eq!(ns.name.as_deref(), Some("realtime"));

        let redis = t.redis_deployment.spec.get().await.unwrap();
        let redis_meta = t.redis_deployment.metadata.get().await.unwrap();
        assert_eq!(t.redis_deployment.urn().name(), "redisapp");
        assert_eq!(redis_meta.namespace.as_deref(), Some("realtime"));
        assert_eq!(redis.replicas, 1);
        assert_eq!(redis.template.spec.containers[0].image, "redis:4-32bit");
        assert_eq!(redis.template.spec.containers[0].ports[0].container_port, 6379);

        let app = t.app_deployment.spec.get().await.unwrap();
        assert_eq!(t.app_deployment.urn().name(), "realtimeapp");
        assert_eq!(app.replicas, 3);
        let container = &app.template.spec.containers[0];
        assert_eq!(container.image, "gbaeke/fluxapp:1.0.0");
        assert_eq!(container.ports[0].container_port, 8080);
        assert_eq!(container.env[0].name, "REDISHOST");
        assert_eq!(container.env[0].value, "redisapp.realtime:6379");

        let kubeconfig = summary.outputs[KUBECONFIG_OUTPUT].as_str().unwrap();
        assert!(!kubeconfig.is_empty());
        assert!(Kubeconfig::parse(kubeconfig).is_ok());
        assert!(summary.secret_outputs.contains(KUBECONFIG_OUTPUT));
    }

    #[tokio::test]
    async fn test_redis_host_matches_service_address() {
        let (t, _, _) = run(TEST_KEY, 5).await;
        assert_eq!(t.redis_service.address().get().await.unwrap(), redis_host());
    }

    #[tokio::test]
    async fn test_ssh_key_only_changes_cluster_credentials() {
        let (_, _, first) = run(TEST_KEY, 6).await;
        let (_, _, second) = run("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 other", 6).await;

        let first = first.steps();
        let second = second.steps();
        assert_eq!(first.len(), second.len());

        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.urn, b.urn);
            if a.type_token == KubernetesClusterArgs::TYPE {
                let mut a_inputs = a.inputs.clone();
                let mut b_inputs = b.inputs.clone();
                assert_ne!(a_inputs, b_inputs);
                a_inputs["linuxProfile"]["sshKey"]["keyData"] = "".into();
                b_inputs["linuxProfile"]["sshKey"]["keyData"] = "".into();
                assert_eq!(a_inputs, b_inputs);
            } else {
                assert_eq!(a.inputs, b.inputs, "{} changed", a.urn);
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_ssh_key_is_a_validation_error() {
        let (mut ctx, engine) = context(Some("not-a-key"), 7);
        declare(&mut ctx).unwrap();

        let err = ctx.finish().await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(!err.to_string().contains("not-a-key"));

        // Only the network resources ahead of the cluster reached the engine
        assert_eq!(engine.steps().len(), 3);
    }

    #[tokio::test]
    async fn test_ssh_key_never_rendered_in_plan() {
        let key = "ssh-rsa AAAASECRETADMINKEY admin@realtime";
        let (t, summary, engine) = run(key, 10).await;

        let cluster = step_for(&engine, &t.cluster);
        assert!(cluster.secrets.contains("/linuxProfile/sshKey/keyData"));
        assert_eq!(cluster.inputs["linuxProfile"]["sshKey"]["keyData"], key);

        let yaml = engine.plan("realtimetest", "dev", &summary).to_yaml().unwrap();
        assert!(!yaml.contains("AAAASECRETADMINKEY"));
        assert!(yaml.contains(crate::engine::preview::SECRET_MASK));
    }

    #[test]
    fn test_address_plan_is_consistent() {
        assert!(check_address_plan().is_ok());
    }

    #[tokio::test]
    async fn test_plan_masks_kubeconfig() {
        let (_, summary, engine) = run(TEST_KEY, 8).await;
        let plan = engine.plan("realtimetest", "dev", &summary);

        let yaml = plan.to_yaml().unwrap();
        assert!(!yaml.contains("certificate-authority-data"));
        assert_eq!(plan.outputs[KUBECONFIG_OUTPUT], crate::engine::preview::SECRET_MASK);
        assert_eq!(plan.resources.len(), 10);
    }

    #[tokio::test]
    async fn test_manifests_cover_workloads() {
        let (_, _, engine) = run(TEST_KEY, 9).await;
        let yaml = crate::k8s::manifest::render(&engine.steps()).unwrap();

        assert_eq!(yaml.matches("kind: Deployment").count(), 2);
        assert_eq!(yaml.matches("kind: Service").count(), 2);
        assert_eq!(yaml.matches("kind: Namespace").count(), 1);
        assert!(yaml.contains("type: LoadBalancer"));
    }
}
