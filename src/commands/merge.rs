use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

use crate::config::Config;
use crate::pipeline::Orchestrator;

/// Command to consolidate every cache unit under a root directory
pub struct MergeCommand {
    root: PathBuf,
    clean: bool,
    jobs: Option<usize>,
}

impl MergeCommand {
    pub fn new(root: PathBuf, clean: bool, jobs: Option<usize>) -> Self {
        Self { root, clean, jobs }
    }

    pub async fn execute(&self) -> Result<()> {
        if !self.root.exists() {
            return Err(anyhow!("Cache directory does not exist: {:?}", self.root));
        }

        if !self.root.is_dir() {
            return Err(anyhow!("Path is not a directory: {:?}", self.root));
        }

        let mut config = Config::from_env();
        if let Some(jobs) = self.jobs {
            config.workers = jobs.max(1);
        }

        info!(
            "🚀 Consolidating cache folders in {:?} with {} worker(s)",
            self.root, config.workers
        );
        if self.clean {
            info!("🧹 Source folders will be removed after each successful merge");
        }

        let orchestrator = Orchestrator::new(self.root.clone(), self.clean, config);

        // Ctrl-C abandons in-flight merges; their staging files never reach
        // the final output names, so finished outputs stay intact.
        tokio::select! {
            result = orchestrator.run() => {
                let summary = result?;
                summary.print();
                Ok(())
            }
            _ = signal::ctrl_c() => {
                info!("🛑 Shutdown signal received. Exiting gracefully.");
                Ok(())
            }
        }
    }
}
