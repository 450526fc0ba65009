//! [`Repository`] keeps a cache of compiled [`Ruler`]s fed from a
//! [`Driver`], refreshing it as the driver streams changes. Mirrors
//! `repository.go`'s `defaultRepository`: a startup snapshot load, an
//! optional key filter, pluggable per-key overrides for how a raw document
//! becomes a [`Ruler`], and a background reconciliation loop.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::document;
use crate::driver::Driver;
use crate::error::{EngineError, RuleError};
use crate::expr::CompileFn;
use crate::rule::Ruler;
use crate::value::{Data, KeyValue, Payload};

/// One cached entry: the raw document as last seen from the driver, plus the
/// [`Ruler`] compiled from it.
#[derive(Debug, Clone)]
pub struct Container {
    pub key_value: KeyValue,
    pub ruler: Ruler,
}

impl Container {
    /// Evaluate this entry's compiled ruler against a payload.
    pub fn calculate(&self, payload: &Payload) -> Result<Data, RuleError> {
        self.ruler.calculate(payload)
    }
}

/// Receives [`KeyValue`] events as the repository applies them, e.g. to
/// fan changes out to a pub/sub layer. Grounded on the source's
/// `contract.Dispatcher`, narrowed to the one call this crate needs.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, event: &KeyValue);
}

/// Per-key override: build a [`Ruler`] directly from the raw document bytes,
/// bypassing the default YAML-document loader entirely.
pub type RulerFactory = Arc<dyn Fn(&[u8]) -> Result<Ruler, RuleError> + Send + Sync>;

#[derive(Default)]
struct Overrides {
    ruler_factories: HashMap<String, RulerFactory>,
    compile_fns: HashMap<String, CompileFn>,
    default_ruler_factory: Option<RulerFactory>,
    default_compile_fn: Option<CompileFn>,
}

/// Builder for [`Repository`]: key filter, dispatcher, and per-key/global
/// overrides for how a document becomes a compiled [`Ruler`].
#[derive(Default)]
pub struct RepositoryBuilder {
    regex: Option<Regex>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    overrides: Overrides,
}

impl RepositoryBuilder {
    pub fn new() -> Self {
        RepositoryBuilder::default()
    }

    /// Only track keys matching `regex`; all others are ignored at startup
    /// and on every subsequent watch event.
    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Override how `key`'s document is turned into a [`Ruler`].
    pub fn with_ruler_factory(mut self, key: impl Into<String>, factory: RulerFactory) -> Self {
        self.overrides.ruler_factories.insert(key.into(), factory);
        self
    }

    /// Override the compile function used for `key`'s embedded expressions,
    /// while still loading it through the default YAML-document reader.
    pub fn with_compile_fn(mut self, key: impl Into<String>, compile_fn: CompileFn) -> Self {
        self.overrides.compile_fns.insert(key.into(), compile_fn);
        self
    }

    /// Fallback ruler factory for any key with no per-key override.
    pub fn with_default_ruler_factory(mut self, factory: RulerFactory) -> Self {
        self.overrides.default_ruler_factory = Some(factory);
        self
    }

    /// Fallback compile function for any key with no per-key override.
    pub fn with_default_compile_fn(mut self, compile_fn: CompileFn) -> Self {
        self.overrides.default_compile_fn = Some(compile_fn);
        self
    }

    /// Load the startup snapshot from `driver` and build the repository.
    /// Does not start the watch loop -- call [`Repository::watch`] for that.
    pub async fn build<D: Driver + 'static>(self, driver: Arc<D>) -> Result<Repository<D>, EngineError> {
        let mut containers = HashMap::new();

        let items = driver.all().await.map_err(|e| EngineError::StreamFatal(e.to_string()))?;
        for item in items {
            if !self.accepts(&item.key) {
                continue;
            }
            match self.generate_ruler(&item) {
                Ok(ruler) => {
                    if let Some(dispatcher) = &self.dispatcher {
                        dispatcher.dispatch(&item);
                    }
                    containers.insert(item.key.clone(), Container { key_value: item, ruler });
                }
                Err(err) => {
                    tracing::error!(key = %item.key, error = %err, "failed to generate rule");
                }
            }
        }

        tracing::info!(count = containers.len(), "rules loaded");

        Ok(Repository {
            driver,
            containers: Arc::new(parking_lot::RwLock::new(containers)),
            regex: self.regex,
            dispatcher: self.dispatcher,
            overrides: Arc::new(self.overrides),
        })
    }

    fn accepts(&self, key: &str) -> bool {
        self.regex.as_ref().is_none_or(|re| re.is_match(key))
    }

    fn generate_ruler(&self, item: &KeyValue) -> Result<Ruler, RuleError> {
        generate_ruler(&self.overrides, item)
    }
}

fn generate_ruler(overrides: &Overrides, item: &KeyValue) -> Result<Ruler, RuleError> {
    if let Some(factory) = overrides.ruler_factories.get(&item.key) {
        return factory(&item.value);
    }
    if let Some(factory) = &overrides.default_ruler_factory {
        return factory(&item.value);
    }
    if let Some(compile_fn) = overrides.compile_fns.get(&item.key) {
        return document::load_ruler_with(&item.value, compile_fn);
    }
    if let Some(compile_fn) = &overrides.default_compile_fn {
        return document::load_ruler_with(&item.value, compile_fn);
    }
    document::load_ruler(&item.value)
}

/// A cache of compiled [`Ruler`]s kept in sync with an external driver.
/// Cheap to clone: the cache and driver handle are both `Arc`-backed.
pub struct Repository<D> {
    driver: Arc<D>,
    containers: Arc<parking_lot::RwLock<HashMap<String, Container>>>,
    regex: Option<Regex>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    overrides: Arc<Overrides>,
}

impl<D> Clone for Repository<D> {
    fn clone(&self) -> Self {
        Repository {
            driver: Arc::clone(&self.driver),
            containers: Arc::clone(&self.containers),
            regex: self.regex.clone(),
            dispatcher: self.dispatcher.clone(),
            overrides: Arc::clone(&self.overrides),
        }
    }
}

impl<D: Driver + 'static> Repository<D> {
    /// The compiled ruler cached under `name`, if any.
    pub fn get_ruler(&self, name: &str) -> Option<Ruler> {
        self.containers.read().get(name).map(|c| c.ruler.clone())
    }

    /// The raw document bytes last seen for `name`, if any.
    pub fn get_raw(&self, name: &str) -> Option<Vec<u8>> {
        self.containers.read().get(name).map(|c| c.key_value.value.clone())
    }

    /// Number of cached rules.
    pub fn count(&self) -> usize {
        self.containers.read().len()
    }

    /// Run the reconciliation loop until the driver's watch stream ends or
    /// reports a fatal error. Only keys already present in the startup
    /// snapshot are ever updated here -- a watch event for a brand-new key
    /// is logged and dropped, matching the upstream `updateRuleSet` check.
    /// A delete event removes the key outright, filter or not.
    pub async fn watch(&self) -> Result<(), EngineError> {
        let mut stream = self.driver.watch().await;
        while let Some(kv) = stream.recv().await {
            if let Some(reason) = &kv.err {
                return Err(EngineError::StreamFatal(reason.clone()));
            }
            if !self.regex.as_ref().is_none_or(|re| re.is_match(&kv.key)) {
                continue;
            }

            if kv.is_delete() {
                self.containers.write().remove(&kv.key);
                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.dispatch(&kv);
                }
                tracing::info!(key = %kv.key, "rule removed");
                continue;
            }

            match generate_ruler(&self.overrides, &kv) {
                Ok(ruler) => {
                    let updated = {
                        let mut containers = self.containers.write();
                        if let Some(slot) = containers.get_mut(&kv.key) {
                            *slot = Container { key_value: kv.clone(), ruler };
                            true
                        } else {
                            false
                        }
                    };
                    if updated {
                        if let Some(dispatcher) = &self.dispatcher {
                            dispatcher.dispatch(&kv);
                        }
                        tracing::info!(key = %kv.key, "rule updated");
                    } else {
                        tracing::warn!(key = %kv.key, "ignoring watch event for a key outside the startup snapshot");
                    }
                }
                Err(err) => {
                    tracing::error!(key = %kv.key, error = %err, "failed to generate rule");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;

    fn basic_doc(value: i64) -> Vec<u8> {
        format!("style: basic\nrule:\n  i: {value}\n").into_bytes()
    }

    #[tokio::test]
    async fn startup_snapshot_populates_the_cache() {
        let driver = Arc::new(MemoryDriver::new());
        driver.seed("/rule/a", basic_doc(1));
        driver.seed("/rule/b", basic_doc(2));

        let repo = RepositoryBuilder::new().build(driver).await.unwrap();
        assert_eq!(repo.count(), 2);
        assert!(repo.get_ruler("/rule/a").is_some());
    }

    #[tokio::test]
    async fn regex_filter_excludes_non_matching_keys() {
        let driver = Arc::new(MemoryDriver::new());
        driver.seed("/rule/a", basic_doc(1));
        driver.seed("/other/b", basic_doc(2));

        let repo = RepositoryBuilder::new()
            .with_regex(Regex::new(r"^/rule/").unwrap())
            .build(driver)
            .await
            .unwrap();
        assert_eq!(repo.count(), 1);
        assert!(repo.get_ruler("/other/b").is_none());
    }

    #[tokio::test]
    async fn watch_updates_an_existing_key_but_ignores_a_new_one() {
        let driver = Arc::new(MemoryDriver::new());
        driver.seed("/rule/a", basic_doc(1));
        let repo = RepositoryBuilder::new().build(Arc::clone(&driver)).await.unwrap();

        let repo_bg = repo.clone();
        let handle = tokio::spawn(async move { repo_bg.watch().await });

        driver.put("/rule/a", basic_doc(99));
        driver.put("/rule/new", basic_doc(7));
        // give the spawned task a scheduling slot to drain the channel
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(repo.count(), 1);
        let payload = Payload::default();
        let data = repo.get_ruler("/rule/a").unwrap().calculate(&payload).unwrap();
        assert_eq!(data.get("i").unwrap(), 99);
        assert!(repo.get_ruler("/rule/new").is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn watch_delete_removes_the_key() {
        let driver = Arc::new(MemoryDriver::new());
        driver.seed("/rule/a", basic_doc(1));
        let repo = RepositoryBuilder::new().build(Arc::clone(&driver)).await.unwrap();

        let repo_bg = repo.clone();
        let handle = tokio::spawn(async move { repo_bg.watch().await });

        driver.delete("/rule/a");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(repo.count(), 0);
        handle.abort();
    }
}
