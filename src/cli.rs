use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{connect_sources, Aggregator};
use crate::auth::Token;
use crate::config::{env_sources, Config};
use crate::dashboard::{terminal, Dashboard};
use crate::providers::{SourceKind, SourceSpec};

#[derive(Parser)]
#[command(name = "ciwatch")]
#[command(author, version, about = "Live terminal dashboard for CI/CD pipelines", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Add a simulated source that needs no network access
    #[arg(short, long, default_value_t = false)]
    mock: bool,

    /// Check that every source is reachable before starting
    #[arg(long, default_value_t = false)]
    validate: bool,

    /// Log file; the terminal itself belongs to the dashboard
    #[arg(long, env = "CIWATCH_LOG_FILE", default_value = "ciwatch.log")]
    pub log_file: PathBuf,
}

impl Cli {
    fn source_specs(&self) -> Result<Vec<SourceSpec>> {
        let config = Config::load(self.config.as_deref())?;
        let lookup = |name: &str| std::env::var(name).ok();

        let mut specs = config.source_specs(lookup);
        if specs.is_empty() {
            specs = env_sources(lookup);
        }
        if self.mock {
            specs.push(SourceSpec::new(SourceKind::Simulator, "mock"));
        }

        Ok(specs)
    }

    pub async fn execute(&self) -> Result<()> {
        let specs = self.source_specs()?;
        if specs.is_empty() {
            bail!(
                "No sources configured. Add [[sources]] to ciwatch.toml, set the \
                 GITHUB_*/GITLAB_* variables or pass --mock"
            );
        }

        for spec in &specs {
            info!(
                "Configured {} source {} (token: {})",
                spec.kind,
                spec.name,
                spec.token
                    .as_ref()
                    .map_or_else(|| "MISSING".to_string(), Token::redacted)
            );
        }

        let cancel = CancellationToken::new();
        let registry = connect_sources(&specs, self.validate, &cancel).await?;
        info!(
            "Watching {}",
            registry.names().collect::<Vec<_>>().join(", ")
        );

        let aggregator = Aggregator::start(&registry);
        terminal::run(Dashboard::new(registry), aggregator, cancel).await
    }
}
