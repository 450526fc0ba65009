//! The public facade: `Engine::start(driver).await` wires a [`Driver`] to a
//! [`Repository`] and spawns its reconciliation loop, then `engine.of(name)`
//! hands back a tenant-scoped handle to calculate a rule against a payload.
//! Mirrors the source's `client.DefaultRuleEngine` / `ofRule`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::accessor::Accessor;
use crate::driver::Driver;
use crate::error::EngineError;
use crate::repository::{Repository, RepositoryBuilder};
use crate::value::Payload;

/// A running rule engine: a synced [`Repository`] plus its background watch
/// task. Cheap to clone -- the repository cache is `Arc`-backed.
#[derive(Clone)]
pub struct Engine<D> {
    repository: Repository<D>,
}

/// Handle to the background reconciliation task. Dropping it leaves the task
/// running; call [`EngineHandle::shutdown`] to cancel it.
pub struct EngineHandle {
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Cancel the watch loop and wait for it to unwind. Returns
    /// `Err(EngineError::Cancelled)` on the expected clean-shutdown path; any
    /// other outcome (the task had already ended, e.g. via
    /// `EngineError::StreamFatal`) is surfaced as-is.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.task.abort();
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Err(EngineError::Cancelled),
            Err(err) => Err(EngineError::StreamFatal(err.to_string())),
        }
    }
}

impl<D: Driver + 'static> Engine<D> {
    /// Load the startup snapshot from `driver` and start watching it for
    /// changes, using the default repository configuration (no key filter,
    /// no overrides).
    pub async fn start(driver: D) -> Result<(Self, EngineHandle), EngineError> {
        Self::start_with(RepositoryBuilder::new(), driver).await
    }

    /// Same as [`Engine::start`], but with a caller-configured
    /// [`RepositoryBuilder`] (key filter, dispatcher, per-key overrides).
    pub async fn start_with(builder: RepositoryBuilder, driver: D) -> Result<(Self, EngineHandle), EngineError> {
        let repository = builder.build(Arc::new(driver)).await?;

        let watched = repository.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = watched.watch().await {
                tracing::error!(error = %err, "repository watch loop terminated");
            }
        });

        Ok((Engine { repository }, EngineHandle { task }))
    }

    /// Number of rules currently cached.
    pub fn count(&self) -> usize {
        self.repository.count()
    }

    /// Scope to a single named rule.
    pub fn of<'a>(&'a self, rule_name: &str) -> Tenant<'a, D> {
        Tenant {
            engine: self,
            rule_name: rule_name.to_string(),
        }
    }
}

/// A handle scoped to one rule name, ready to calculate against a payload.
pub struct Tenant<'a, D> {
    engine: &'a Engine<D>,
    rule_name: String,
}

impl<D: Driver + 'static> Tenant<'_, D> {
    /// Calculate the scoped rule against `payload`, returning a typed
    /// [`Accessor`] over the result.
    pub fn payload(&self, payload: &Payload) -> Result<Accessor, EngineError> {
        let ruler = self
            .engine
            .repository
            .get_ruler(&self.rule_name)
            .ok_or_else(|| EngineError::NotFound(self.rule_name.clone()))?;
        let data = ruler.calculate(payload)?;
        Ok(Accessor::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use serde_json::Value;

    #[tokio::test]
    async fn of_calculates_against_the_cached_rule() {
        let driver = MemoryDriver::new();
        driver.seed(
            "/rule/discount",
            b"style: advanced\nrule:\n  - if: plan == \"pro\"\n    then:\n      pct: 20\n  - if: \"true\"\n    then:\n      pct: 0\n".to_vec(),
        );

        let (engine, handle) = Engine::start(driver).await.unwrap();
        let payload = Payload::from_pairs([("plan", Value::from("pro"))]);
        let accessor = engine.of("/rule/discount").payload(&payload).unwrap();
        assert_eq!(accessor.int("pct"), 20);

        assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn of_reports_not_found_for_an_unknown_rule() {
        let driver = MemoryDriver::new();
        let (engine, handle) = Engine::start(driver).await.unwrap();
        let err = engine.of("/rule/missing").payload(&Payload::default()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(matches!(handle.shutdown().await, Err(EngineError::Cancelled)));
    }
}
