use std::sync::Arc;

use aiops_core::identity::IdentitySwitcher;
use aiops_core::scripting::artifact::ScriptMaterializer;
use aiops_core::scripting::orchestrator::Orchestrator;
use aiops_core::scripting::subprocess::{ProcessRunner, RunnerConfig};

use crate::auth::manager::SecurityManager;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Token verification, issuance and the cipher.
    pub security: Arc<SecurityManager>,
    /// Execution backend (Process Runner, Script Materializer, identity).
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the components from `config`. `switcher` is the platform identity
    /// switcher, or `None` where identity switching is unavailable.
    pub fn new(config: ServerConfig, switcher: Option<Arc<dyn IdentitySwitcher>>) -> Self {
        let security = SecurityManager::new(
            config.jwt.clone(),
            &config.aes_key,
            config.issuance_secret_hash.clone(),
        );

        let runner = ProcessRunner::new(RunnerConfig {
            max_output_bytes: config.max_output_bytes,
            work_root: config.temp_dir.join("work"),
        });
        let materializer =
            ScriptMaterializer::new(config.temp_dir.join("scripts"), config.default_language);
        let orchestrator = Orchestrator::new(runner, materializer, switcher, config.exec_timeout());

        Self {
            config: Arc::new(config),
            security: Arc::new(security),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
