use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use oomd::config;
use oomd::engine::PluginConstructionContext;
use oomd::{Oomd, OomdError};

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_FATAL_RUNTIME: u8 = 64;

#[derive(Parser, Debug)]
#[command(name = "oomd", about = "Userspace out-of-memory killer for cgroup v2")]
struct Args {
    /// Rule-program config file
    #[arg(long, default_value = "/etc/oomd/oomd.json")]
    config: String,

    /// Tick interval in seconds
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Mount point of the cgroup2 unified hierarchy
    #[arg(long = "cgroup-fs-root", default_value = "/sys/fs/cgroup")]
    cgroup_fs_root: String,

    /// Print the parsed config and exit
    #[arg(long)]
    dump_config: bool,
}

fn load_engine(args: &Args) -> anyhow::Result<oomd::engine::Engine> {
    let input = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read config {}", args.config))?;
    let ir = config::json::parse(&input)
        .with_context(|| format!("failed to parse config {}", args.config))?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&ir.to_json())?);
    }

    let context = PluginConstructionContext::new(&args.cgroup_fs_root);
    config::compile(&ir, &context).context("failed to compile rule program")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let engine = match load_engine(&args) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "config error");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if args.dump_config {
        return ExitCode::SUCCESS;
    }

    let daemon = Oomd::new(engine, Duration::from_secs(args.interval));
    match daemon.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ OomdError::MissingController(_)) => {
            error!(error = %e, "fatal runtime error");
            ExitCode::from(EXIT_FATAL_RUNTIME)
        }
        Err(e) => {
            error!(error = %e, "runtime error");
            ExitCode::from(EXIT_FATAL_RUNTIME)
        }
    }
}
