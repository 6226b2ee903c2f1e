//! Session setup shared by plan, validate, apply and destroy.

use anyhow::{Context, Result};
use cloudkit::{Backend, LocalBackend};
use converge::{CancelToken, ExecuteOptions, Graph, Snapshot, ValidationReport};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{DocumentArgs, GlobalArgs};
use crate::config::StratumConfig;
use crate::document;

/// Everything one invocation works on.
pub struct Session {
    pub config: StratumConfig,
    pub graph: Graph,
    backend: Arc<LocalBackend>,
    jobs: usize,
    step_timeout: Option<Duration>,
}

impl Session {
    pub fn open(global: &GlobalArgs, doc: &DocumentArgs) -> Result<Self> {
        let config = StratumConfig::load(global.config.as_deref())?;

        let mut resources = document::load(&doc.document)
            .with_context(|| format!("Failed to load {}", doc.document.display()))?;
        if let Some(path) = &doc.overrides {
            let overrides = document::load_overrides(path)
                .with_context(|| format!("Failed to load overrides {}", path.display()))?;
            document::apply_overrides(&mut resources, &overrides)?;
        }
        log::info!("Loaded {} declared resource(s)", resources.len());

        let graph = Graph::build(resources)?;
        let backend = open_backend(&config, global)?;

        Ok(Self {
            jobs: config.jobs(global),
            step_timeout: config.step_timeout(global),
            config,
            graph,
            backend,
        })
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Read the live state of every declared resource.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::capture(&self.graph, self.backend.as_ref(), self.jobs)?)
    }

    pub fn validate(&self) -> Result<ValidationReport> {
        Ok(converge::validate(&self.graph, self.backend.as_ref(), self.jobs)?)
    }

    pub fn execute_options(&self, allow_destructive: bool, cancel: CancelToken) -> ExecuteOptions {
        ExecuteOptions {
            jobs: self.jobs,
            step_timeout: self.step_timeout,
            retry: self.config.retry.to_retry_config(),
            allow_destructive,
            cancel,
        }
    }
}

/// Open the local backend at the configured state file.
pub fn open_backend(config: &StratumConfig, global: &GlobalArgs) -> Result<Arc<LocalBackend>> {
    let state_file = config.state_file(global)?;
    let backend = LocalBackend::open(state_file.clone(), config.backend.soft_delete_retention_days)
        .with_context(|| format!("Failed to open backend state {}", state_file.display()))?;
    log::debug!("Backend state: {}", state_file.display());
    Ok(Arc::new(backend))
}
