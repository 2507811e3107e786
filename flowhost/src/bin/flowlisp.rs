//! Flowlisp script runner
//!
//! Usage:
//!   flowlisp [--config flow.toml] [--fixtures bridge.json] [--timeout-ms N] script.flow
//!   flowlisp --expr '(+ 1 2)'

use clap::Parser;
use flowhost::{init_tracing, FixtureBridge, FlowConfig, ScriptRunner};
use flowlisp::runtime::{create_pure_bridge, Environment, TaskBridge};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "flowlisp")]
#[command(about = "Evaluate a Flowlisp workflow script")]
struct Args {
    /// Script file to evaluate
    script: Option<PathBuf>,

    /// Evaluate this source text instead of a file
    #[arg(long, short = 'e', conflicts_with = "script")]
    expr: Option<String>,

    /// Path to configuration file (TOML format)
    #[arg(long, env = "FLOWLISP_CONFIG")]
    config: Option<PathBuf>,

    /// JSON fixtures answering context and task calls
    #[arg(long, env = "FLOWLISP_FIXTURES")]
    fixtures: Option<PathBuf>,

    /// Wall-clock budget for the whole script
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Tracing filter directives (overrides the config file)
    #[arg(long)]
    log_filter: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    /// CLI arguments take precedence over config file values
    fn load_config(&self) -> anyhow::Result<FlowConfig> {
        let mut config = match &self.config {
            Some(path) => FlowConfig::from_file(path)?,
            None => FlowConfig::default(),
        };
        if let Some(timeout_ms) = self.timeout_ms {
            config.run.timeout_ms = Some(timeout_ms);
        }
        if let Some(fixtures) = &self.fixtures {
            config.fixtures.path = Some(fixtures.clone());
        }
        if let Some(filter) = &self.log_filter {
            config.logging.filter = filter.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_tracing(&config.logging)?;
    debug!(?config, "effective configuration");

    let bridge: Rc<dyn TaskBridge> = match &config.fixtures.path {
        Some(path) => {
            info!(fixtures = %path.display(), "using fixture bridge");
            Rc::new(FixtureBridge::from_file(path)?)
        }
        None => create_pure_bridge(),
    };

    let runner = ScriptRunner::new(&config, bridge);
    let env = Environment::new();

    let value = match (&args.expr, &args.script) {
        (Some(source), _) => runner.run_source(source, &env).await?,
        (None, Some(path)) => runner.run_file(path, &env).await?,
        (None, None) => anyhow::bail!("provide a script file or --expr"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    } else {
        println!("{}", value);
    }
    Ok(())
}
