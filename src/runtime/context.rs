/// Run-scoped context threaded through every declaration
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::graph::{ResourceGraph, ResourceNode};
use super::output::{Output, OutputValue};
use super::{is_provider_type, package_of, Resource, ResourceArgs, ResourceOptions, Urn};
use crate::config::{Config, StackConfig};
use crate::engine::{Engine, RegisterRequest};
use crate::error::{Error, Result};

/// Engine-reported state of one registered resource
#[derive(Debug, Clone, Serialize)]
pub struct ResourceState {
    pub urn: Urn,
    pub id: String,
    pub outputs: serde_json::Value,
    /// JSON pointers into `outputs` the engine reported as secret
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub secret_outputs: BTreeSet<String>,
}

impl ResourceState {
    /// Whether the value at `pointer` is, contains or sits inside a secret output
    pub fn is_secret_at(&self, pointer: &str) -> bool {
        let nested = |outer: &str, inner: &str| {
            inner == outer
                || inner
                    .strip_prefix(outer)
                    .is_some_and(|rest| rest.starts_with('/'))
        };
        self.secret_outputs
            .iter()
            .any(|secret| nested(secret.as_str(), pointer) || nested(pointer, secret.as_str()))
    }
}

/// Handle returned for every registered resource
#[derive(Debug, Clone)]
pub struct CustomResource {
    urn: Urn,
    state: Output<ResourceState>,
}

impl CustomResource {
    pub fn state(&self) -> &Output<ResourceState> {
        &self.state
    }

    /// Physical id assigned by the engine
    pub fn id(&self) -> Output<String> {
        self.state.apply(|state| Ok(state.id))
    }

    /// Typed output property at a JSON pointer (e.g. "/metadata/name")
    ///
    /// The output is secret once resolved if the engine reported anything
    /// at or under the pointer as secret.
    pub fn output<T>(&self, pointer: &str) -> Output<T>
    where
        T: OutputValue + DeserializeOwned,
    {
        let pointer = pointer.to_string();
        let urn = self.urn.clone();
        self.state.apply_with_secret(move |state| {
            let value = state
                .outputs
                .pointer(&pointer)
                .cloned()
                .ok_or_else(|| Error::output(format!("{} has no output at {}", urn, pointer)))?;
            let value = serde_json::from_value(value).map_err(|e| {
                Error::output(format!("{} output {} has unexpected shape: {}", urn, pointer, e))
            })?;
            Ok((value, state.is_secret_at(&pointer)))
        })
    }
}

impl Resource for CustomResource {
    fn urn(&self) -> &Urn {
        &self.urn
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Resource states in declaration order
    pub resources: Vec<ResourceState>,
    /// Stack outputs by name
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Names of outputs holding secret values
    pub secret_outputs: BTreeSet<String>,
}

/// Declaration context for one run
///
/// Registration only records the declaration and builds a lazy state
/// future; nothing reaches the engine until [`Context::finish`].
pub struct Context {
    stack_config: StackConfig,
    engine: Arc<dyn Engine>,
    graph: ResourceGraph,
    states: HashMap<Urn, Output<ResourceState>>,
    exports: BTreeMap<String, Output<serde_json::Value>>,
}

impl Context {
    /// Create a context for one run against the given engine
    pub fn new(stack_config: StackConfig, engine: Arc<dyn Engine>) -> Self {
        Self {
            stack_config,
            engine,
            graph: ResourceGraph::new(),
            states: HashMap::new(),
            exports: BTreeMap::new(),
        }
    }

    /// Project name; also the default config namespace
    pub fn project(&self) -> &str {
        &self.stack_config.project
    }

    /// Stack name (e.g. "dev")
    pub fn stack(&self) -> &str {
        &self.stack_config.stack
    }

    /// Configuration values under the given namespace
    pub fn config(&self, namespace: &str) -> Config<'_> {
        Config::new(&self.stack_config, namespace)
    }

    /// Everything declared so far
    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Names of the stack outputs exported so far
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }

    /// Declare a resource
    ///
    /// Fails immediately on invalid arguments, a provider of the wrong
    /// package, a duplicate URN or an unknown dependency.
    pub fn register_resource<A: ResourceArgs>(
        &mut self,
        name: &str,
        args: A,
        options: ResourceOptions,
    ) -> Result<CustomResource> {
        let urn = Urn::new(self.stack(), self.project(), A::TYPE, name);

        // Validate arguments before touching the graph
        args.validate()
            .map_err(|message| Error::validation(name, message))?;

        if let Some(provider) = &options.provider {
            self.check_provider(A::TYPE, name, provider)?;
        }

        // Explicit, implicit (from input outputs) and provider dependencies
        let mut dependencies: BTreeSet<Urn> = options.depends_on.iter().cloned().collect();
        dependencies.extend(args.dependencies());
        dependencies.extend(options.provider.iter().cloned());

        self.graph.insert(ResourceNode {
            urn: urn.clone(),
            type_token: A::TYPE.to_string(),
            name: name.to_string(),
            dependencies: dependencies.clone(),
            provider: options.provider.clone(),
        })?;

        let upstream: Vec<(Urn, Output<ResourceState>)> = dependencies
            .iter()
            .filter_map(|dep| self.states.get(dep).map(|s| (dep.clone(), s.clone())))
            .collect();

        let request = RegisterRequest {
            urn: urn.clone(),
            type_token: A::TYPE.to_string(),
            name: name.to_string(),
            provider: options.provider,
            dependencies: dependencies.into_iter().collect(),
            inputs: serde_json::Value::Null,
            secret_inputs: args.secret_inputs(),
        };

        // Lazy registration: dependencies first, then inputs, then the engine
        let engine = Arc::clone(&self.engine);
        let state_urn = urn.clone();
        let state = Output::from_future(
            async move {
                for (dependency, dep_state) in upstream {
                    if dep_state.get().await.is_err() {
                        return Err(Error::DependencyFailed {
                            resource: state_urn.to_string(),
                            dependency: dependency.to_string(),
                        });
                    }
                }

                let inputs = args.resolve().await?;
                debug!("Submitting {} to engine", state_urn);
                let response = engine.register(RegisterRequest { inputs, ..request }).await?;

                Ok(ResourceState {
                    urn: state_urn,
                    id: response.id,
                    outputs: response.outputs,
                    secret_outputs: response.secret_outputs,
                })
            },
            [urn.clone()].into_iter().collect(),
        );

        debug!("Declared {}", urn);
        self.states.insert(urn.clone(), state.clone());

        Ok(CustomResource { urn, state })
    }

    /// Check that `provider` is a provider resource for the same package
    fn check_provider(&self, type_token: &str, name: &str, provider: &Urn) -> Result<()> {
        let node = self.graph.get(provider).ok_or_else(|| Error::UnknownDependency {
            resource: name.to_string(),
            dependency: provider.to_string(),
        })?;

        if !is_provider_type(&node.type_token) {
            return Err(Error::validation(
                name,
                format!("{} is not a provider resource", provider),
            ));
        }

        if package_of(&node.type_token) != package_of(type_token) {
            return Err(Error::validation(
                name,
                format!(
                    "provider {} manages package '{}', not '{}'",
                    provider,
                    package_of(&node.type_token),
                    package_of(type_token)
                ),
            ));
        }

        Ok(())
    }

    /// Record a named stack output
    pub fn export<T>(&mut self, name: &str, output: Output<T>) -> Result<()>
    where
        T: OutputValue + Serialize,
    {
        if self.exports.contains_key(name) {
            return Err(Error::DuplicateExport(name.to_string()));
        }

        let value = output.apply(|v| serde_json::to_value(v).map_err(Error::from));
        self.exports.insert(name.to_string(), value);
        Ok(())
    }

    /// Drive every registration and export to completion
    ///
    /// On failure the first error in declaration order is returned, preferring
    /// a root cause over the dependency failures it caused.
    pub async fn finish(self) -> Result<RunSummary> {
        let pending: Vec<_> = self
            .graph
            .nodes()
            .iter()
            .filter_map(|node| self.states.get(&node.urn))
            .map(|state| state.get())
            .collect();
        // Drive every registration; dependency order comes from the futures
        let results = join_all(pending).await;

        let mut resources = Vec::with_capacity(results.len());
        let mut first_error: Option<Error> = None;
        let mut root_cause: Option<Error> = None;

        for result in results {
            match result {
                Ok(state) => resources.push(state),
                Err(err) => {
                    if root_cause.is_none() && !err.is_dependency_failure() {
                        root_cause = Some(err.clone());
                    }
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = root_cause.or(first_error) {
            return Err(err);
        }

        // Resolve exports, recording which turned out secret
        let mut outputs = BTreeMap::new();
        let mut secret_outputs = BTreeSet::new();
        for (name, output) in &self.exports {
            let (value, secret) = output.get_with_secret().await?;
            outputs.insert(name.clone(), value);
            if secret {
                secret_outputs.insert(name.clone());
            }
        }

        info!(
            "Run complete: {} resources, {} outputs",
            resources.len(),
            outputs.len()
        );

        Ok(RunSummary {
            resources,
            outputs,
            secret_outputs,
        })
    }
}
