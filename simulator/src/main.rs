use anyhow::Context;
use clap::Parser;
use report_bridge::bridge::ReportBridge;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{WorkflowArgs, WorkflowConfig};
use workflow::report::write_reports;
use workflow::runner::{summarize, Runner};

mod generator;
mod report_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Batch driver for the transient-detection core")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Event times (absolute seconds) to analyse
    #[arg(long = "event-time", num_args = 1.., default_values_t = [1_126_259_462.4])]
    event_time: Vec<f64>,
    /// Comma-separated sensor names
    #[arg(long, value_delimiter = ',')]
    sensors: Vec<String>,
    /// Peak amplitude of the injected signal
    #[arg(long, default_value_t = 20.0)]
    amplitude: f64,
    /// Half-range of the uniform noise
    #[arg(long, default_value_t = 1.0)]
    noise: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Mark the veto flag active on this sensor around every event
    #[arg(long)]
    veto_sensor: Option<String>,
    /// Per-event deadline in seconds
    #[arg(long)]
    timeout: Option<f64>,
    /// Where to write the JSON report
    #[arg(long, default_value = "reports/analysis.json")]
    report: PathBuf,
    /// Keep the report bridge alive for incoming analysis requests
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = &args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(&WorkflowArgs {
            events: args.event_time.clone(),
            sensors: args.sensors.clone(),
            amplitude: args.amplitude,
            noise: args.noise,
            seed: args.seed,
            veto_sensor: args.veto_sensor.clone(),
        })
    };
    if let Some(description) = &workflow_config.scenario.description {
        log::info!("scenario: {}", description);
    }

    let mut runner = Runner::new(&workflow_config);
    if let Some(seconds) = args.timeout {
        let timeout = Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("invalid timeout {}", seconds))?;
        runner = runner.with_timeout(timeout);
    }
    let runner = Arc::new(runner);

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;

    runtime.block_on(async {
        let reports = runner.execute_all(&workflow_config.events).await?;
        for report in &reports {
            println!("{}", summarize(report));
        }
        write_reports(&args.report, &reports)?;
        println!("Report written to {}", args.report.display());

        if args.serve {
            let bridge = ReportBridge::new(runner.clone());
            for report in reports {
                bridge.publish(report)?;
            }
            println!("HTTP bridge on {} (Ctrl+C to stop)...", args.bind);
            tokio::select! {
                _ = bridge.serve(args.bind) => {}
                result = signal::ctrl_c() => {
                    result.context("awaiting Ctrl+C to exit")?;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}
