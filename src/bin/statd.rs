//! statd — the node runtime-counter collector process.
//!
//! The mailbox name comes from `STORVISOR_MAILBOX`. A counter source that
//! cannot be opened is a startup failure (exit 1): the process is useless
//! without its counters.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use storvisor::core::wait_for_termination;
use storvisor::mailbox::FileChannel;
use storvisor::service::SlotActions;
use storvisor::sysstat::CounterSources;
use storvisor::{Config, ServiceRuntime, StatCollector};

#[derive(Parser)]
#[command(name = "statd", about = "Node statistics service")]
struct Args {
    /// Directory holding the mailbox slots.
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<std::path::PathBuf>,

    /// Heartbeat interval in seconds.
    #[arg(long, value_name = "SECONDS")]
    heartbeat: Option<u64>,

    /// Sampling interval in seconds.
    #[arg(long, value_name = "SECONDS")]
    poll: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut cfg = Config::from_env()?;
    if let Some(dir) = args.runtime_dir {
        cfg.runtime_dir = dir;
    }
    if let Some(secs) = args.heartbeat {
        cfg.heartbeat = std::time::Duration::from_secs(secs.max(1));
    }
    if let Some(secs) = args.poll {
        cfg.poll = std::time::Duration::from_secs(secs.max(1));
    }

    let sources = CounterSources::open_proc().context("opening counter sources")?;
    let channel = Arc::new(
        FileChannel::open(&cfg.runtime_dir, &cfg.mailbox, cfg.channel_capacity)
            .with_context(|| format!("opening mailbox {:?}", cfg.mailbox))?,
    );
    let actions = SlotActions::new(channel.clone(), cfg.command_poll);
    let collector = StatCollector::new(channel.clone(), sources);

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if wait_for_termination().await.is_ok() {
            signal_token.cancel();
        }
    });

    let runtime = ServiceRuntime::new(
        channel,
        collector,
        Box::new(actions),
        None,
        cfg.runtime_options(),
    );
    runtime.run(token).await;
    Ok(())
}
