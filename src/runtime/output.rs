/// Promise-like handles to values produced by registered resources
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use super::Urn;
use crate::error::{Error, Result};

/// Bound for values carried by an [`Output`]
pub trait OutputValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> OutputValue for T {}

/// A value that becomes known once the resources it derives from resolve
///
/// Outputs are lazy: nothing runs until the output (or one derived from it)
/// is awaited. Cloning is cheap and every clone observes the same result.
///
/// Secrecy is tracked twice. The static flag is set by [`Output::as_secret`]
/// and is visible at declaration time. The resolved value also carries a
/// flag, which picks up outputs the engine reports as secret.
pub struct Output<T> {
    value: Shared<BoxFuture<'static, Result<(T, bool)>>>,
    resources: BTreeSet<Urn>,
    secret: bool,
}

impl<T: OutputValue> Output<T> {
    /// An output that is already known and depends on nothing
    pub fn known(value: T) -> Self {
        Self::from_future(future::ready(Ok(value)), BTreeSet::new())
    }

    /// An output that always fails with the given error
    pub fn failed(err: Error) -> Self {
        Self::from_future(future::ready(Err(err)), BTreeSet::new())
    }

    pub(crate) fn from_future<F>(fut: F, resources: BTreeSet<Urn>) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            value: async move { Ok::<_, Error>((fut.await?, false)) }.boxed().shared(),
            resources,
            secret: false,
        }
    }

    /// Mark the value as secret; derived outputs stay secret
    pub fn as_secret(self) -> Self {
        let value = self.value;
        Self {
            value: async move { Ok::<_, Error>((value.await?.0, true)) }.boxed().shared(),
            resources: self.resources,
            secret: true,
        }
    }

    /// Whether the value is known to be secret at declaration time
    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// Resources this value is derived from
    pub fn resources(&self) -> &BTreeSet<Urn> {
        &self.resources
    }

    /// Wait for the value
    pub async fn get(&self) -> Result<T> {
        Ok(self.value.clone().await?.0)
    }

    /// Wait for the value and whether it turned out to be secret
    pub async fn get_with_secret(&self) -> Result<(T, bool)> {
        let (value, secret) = self.value.clone().await?;
        Ok((value, secret || self.secret))
    }

    /// Derive a new output, keeping dependencies and secrecy
    pub fn apply<U, F>(&self, f: F) -> Output<U>
    where
        U: OutputValue,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.apply_with_secret(move |value| Ok((f(value)?, false)))
    }

    /// Like [`Output::apply`], with `f` also deciding whether the result is secret
    pub(crate) fn apply_with_secret<U, F>(&self, f: F) -> Output<U>
    where
        U: OutputValue,
        F: FnOnce(T) -> Result<(U, bool)> + Send + 'static,
    {
        let value = self.value.clone();
        Output {
            value: async move {
                let (input, secret) = value.await?;
                let (output, derived_secret) = f(input)?;
                Ok::<_, Error>((output, secret || derived_secret))
            }
            .boxed()
            .shared(),
            resources: self.resources.clone(),
            secret: self.secret,
        }
    }

    /// Pair this output with another
    pub fn zip<U: OutputValue>(&self, other: &Output<U>) -> Output<(T, U)> {
        let a = self.value.clone();
        let b = other.value.clone();
        Output {
            value: async move {
                let (a, a_secret) = a.await?;
                let (b, b_secret) = b.await?;
                Ok::<_, Error>(((a, b), a_secret || b_secret))
            }
            .boxed()
            .shared(),
            resources: self.resources.union(&other.resources).cloned().collect(),
            secret: self.secret || other.secret,
        }
    }

    /// Combine several outputs into one
    pub fn all(outputs: &[Output<T>]) -> Output<Vec<T>> {
        let resources = outputs
            .iter()
            .flat_map(|o| o.resources.iter().cloned())
            .collect();
        let secret = outputs.iter().any(|o| o.secret);
        let values: Vec<_> = outputs.iter().map(|o| o.value.clone()).collect();

        Output {
            value: async move {
                let resolved = future::join_all(values)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>>>()?;
                let secret = resolved.iter().any(|(_, s)| *s);
                let values: Vec<T> = resolved.into_iter().map(|(v, _)| v).collect();
                Ok::<_, Error>((values, secret))
            }
            .boxed()
            .shared(),
            resources,
            secret,
        }
    }
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            resources: self.resources.clone(),
            secret: self.secret,
        }
    }
}

impl<T> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("resources", &self.resources)
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

impl From<&str> for Output<String> {
    fn from(value: &str) -> Self {
        Output::known(value.to_string())
    }
}

impl From<String> for Output<String> {
    fn from(value: String) -> Self {
        Output::known(value)
    }
}
