use anyhow::Context as _;
use cloudstage_config::Settings;
use cloudstage_engine::{PollProfile, Stage, StagePhase, WorkflowEngine, WorkflowResult};
use cloudstage_sandbox::{SandboxConfig, SandboxProvider};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STATE_FILE: &str = "sandbox.json";

/// Command-line values that take precedence over the settings file
pub struct Overrides {
    pub region: Option<String>,
    pub interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
}

pub struct Context {
    pub settings: Settings,
    pub provider: Arc<SandboxProvider>,
    pub profile: PollProfile,
}

impl Context {
    pub async fn load(overrides: Overrides) -> anyhow::Result<Self> {
        let mut settings = cloudstage_config::load_settings()?;
        if let Some(region) = overrides.region {
            settings.region = region;
        }
        if let Some(interval) = overrides.interval_ms {
            settings.poll_interval_ms = interval;
        }
        if let Some(timeout) = overrides.timeout_secs {
            settings.server_timeout_secs = timeout;
        }
        if let Some(dir) = overrides.state_dir {
            settings.state_dir = Some(dir);
        }
        settings.validate()?;

        let profile = PollProfile::new(
            settings.poll_interval(),
            settings.server_timeout(),
            settings.image_timeout(),
        )?;

        let state_file = settings.state_dir()?.join(STATE_FILE);
        let provider = SandboxProvider::open(SandboxConfig {
            region: settings.region.clone(),
            ready_after_polls: settings.sandbox.ready_after_polls,
            address_lag_polls: settings.sandbox.address_lag_polls,
            state_file: Some(state_file.clone()),
            ..Default::default()
        })
        .await
        .with_context(|| format!("failed to open sandbox state {}", state_file.display()))?;

        tracing::debug!(region = %settings.region, state = %state_file.display(), "context ready");
        Ok(Self {
            settings,
            provider: Arc::new(provider),
            profile,
        })
    }

    /// Run `stages`, reporting progress on stderr; Ctrl-C cancels and unwinds
    pub async fn run(&self, stages: Vec<Stage>) -> WorkflowResult {
        let token = CancellationToken::new();
        let interrupt = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("{}", "Interrupted, cleaning up...".yellow());
                    token.cancel();
                }
            })
        };

        let engine = WorkflowEngine::new(self.provider.clone())
            .with_cancellation(token)
            .with_observer(|stage, phase| {
                let phase = match phase {
                    StagePhase::Done => phase.to_string().green(),
                    StagePhase::Failed => phase.to_string().red(),
                    _ => phase.to_string().dimmed(),
                };
                eprintln!("  {} {}", stage.cyan(), phase);
            });
        let result = engine.run(stages).await;
        interrupt.abort();
        result
    }
}
