//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "binary"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Control CLI for operators driving the simulated API."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use faultsim_api::{SimulationReport, SimulationRequest};
use faultsim_inject::{FailureConfig, FailureConfigPatch, Probability};
use reqwest::Client;
use tracing_subscriber::EnvFilter;

mod load;

#[derive(Debug, Parser)]
#[command(author, version, about = "faultsim control utility", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "FAULTSIM_TARGET",
        default_value = "http://localhost:5000",
        help = "Base URL of the simulated API"
    )]
    target: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Update the stored failure configuration")]
    Configure(KnobArgs),
    #[command(about = "Run a batch of self-calls and print the summary")]
    Simulate {
        #[arg(long, help = "Number of calls (server default when omitted)")]
        count: Option<u32>,
        #[arg(long, help = "Print the full JSON report")]
        json: bool,
        #[command(flatten)]
        knobs: KnobArgs,
    },
    #[command(about = "Generate load with concurrent virtual users")]
    Load {
        #[arg(long, default_value_t = 10, help = "Concurrent virtual users")]
        users: usize,
        #[arg(long, default_value_t = 60, help = "Run time in seconds")]
        duration: u64,
    },
}

#[derive(Debug, Args)]
struct KnobArgs {
    #[arg(long)]
    error_rate: Option<Probability>,
    #[arg(long)]
    slow_db_prob: Option<Probability>,
    #[arg(long)]
    ext_api_fail_prob: Option<Probability>,
    #[arg(long)]
    timeout_prob: Option<Probability>,
}

impl From<KnobArgs> for FailureConfigPatch {
    fn from(args: KnobArgs) -> Self {
        FailureConfigPatch {
            error_rate: args.error_rate,
            slow_db_prob: args.slow_db_prob,
            ext_api_fail_prob: args.ext_api_fail_prob,
            timeout_prob: args.timeout_prob,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("FAULTSIM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let target = cli.target.trim_end_matches('/').to_owned();

    match cli.command {
        Commands::Configure(knobs) => {
            let client = Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .context("failed to build http client")?;
            let patch = FailureConfigPatch::from(knobs);
            let config: FailureConfig = client
                .post(format!("{target}/configure-failures"))
                .json(&patch)
                .send()
                .await
                .context("configure request failed")?
                .error_for_status()
                .context("configure request rejected")?
                .json()
                .await
                .context("configure response was not a failure configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate { count, json, knobs } => {
            // The server makes the calls sequentially; allow for slow batches.
            let client = Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .context("failed to build http client")?;
            let request = SimulationRequest {
                config: knobs.into(),
                count,
            };
            let report: SimulationReport = client
                .post(format!("{target}/simulate-requests"))
                .json(&request)
                .send()
                .await
                .context("simulate request failed")?
                .error_for_status()
                .context("simulate request rejected")?
                .json()
                .await
                .context("simulate response was not a report")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_summary(&report);
            }
        }
        Commands::Load { users, duration } => {
            let profile = load::LoadProfile {
                users,
                duration: Duration::from_secs(duration),
                ..load::LoadProfile::default()
            };
            let tally = load::run(&target, &profile).await?;
            print!("{}", tally.render());
        }
    }
    Ok(())
}

fn render_summary(report: &SimulationReport) {
    let summary = &report.summary;
    println!(
        "profile: error_rate={} timeout_prob={} slow_db_prob={} ext_api_fail_prob={}",
        report.config.error_rate,
        report.config.timeout_prob,
        report.config.slow_db_prob,
        report.config.ext_api_fail_prob
    );
    println!("total requests : {}", summary.total_requests);
    println!("success        : {}", summary.success_count);
    println!("mild           : {}", summary.mild);
    println!("critical       : {}", summary.critical);
    println!("external       : {}", summary.external);
    println!("avg duration   : {:.3}s", summary.avg_duration);
}
