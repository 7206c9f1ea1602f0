use clap::Parser;
use invoice_scenario::{ChromeBrowser, Config, ErrorKind, InvoiceScenario, ScenarioOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Signs in to the rental app and checks that invoices were generated.
#[derive(Parser, Debug)]
#[command(name = "invoice-scenario")]
#[command(version)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "SCENARIO_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the application under test
    #[arg(long, env = "SCENARIO_BASE_URL")]
    base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Identity for the first login attempt
    #[arg(long, env = "SCENARIO_IDENTITY")]
    identity: Option<String>,

    /// Secret for the first login attempt
    #[arg(long, env = "SCENARIO_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Directory for a screenshot taken when the scenario fails
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Write the JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn load_config(&self) -> invoice_scenario::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(base_url) = &self.base_url {
            config.target.base_url = base_url.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(dir) = &self.screenshot_dir {
            config.artifacts.screenshot_dir = Some(dir.clone());
        }
        config
            .login
            .set_primary_credential(self.identity.clone(), self.secret.clone());
        Ok(config)
    }
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let scenario = match cli.load_config().and_then(InvoiceScenario::new) {
        Ok(scenario) => scenario,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return exit_code(&ScenarioOutcome::Failure {
                kind: ErrorKind::Configuration,
                reason: err.to_string(),
            });
        }
    };

    let report = scenario.run(ChromeBrowser::new()).await;

    if let Some(path) = &cli.report {
        match report.to_json() {
            Ok(json) => match tokio::fs::write(path, json).await {
                Ok(()) => info!(path = %path.display(), "report written"),
                Err(err) => error!(path = %path.display(), error = %err, "could not write report"),
            },
            Err(err) => error!(error = %err, "could not serialize report"),
        }
    }

    match &report.outcome {
        ScenarioOutcome::Success => println!("SUCCESS"),
        ScenarioOutcome::Failure { reason, .. } => eprintln!("FAILURE: {}", reason),
    }
    exit_code(&report.outcome)
}

fn exit_code(outcome: &ScenarioOutcome) -> ExitCode {
    ExitCode::from(outcome.exit_code() as u8)
}
