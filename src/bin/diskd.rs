//! diskd — the disk lifecycle service process.
//!
//! Managed devices come from repeated `--device` flags; the mailbox name
//! comes from `STORVISOR_MAILBOX`. Any startup failure exits with status 1.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use storvisor::core::wait_for_termination;
use storvisor::mailbox::FileChannel;
use storvisor::service::SlotActions;
use storvisor::{AdminServer, Config, DiskManager, DiskSpec, ServiceRuntime, SystemDiskTool};

#[derive(Parser)]
#[command(name = "diskd", about = "Disk lifecycle service")]
struct Args {
    /// Managed device; repeatable. `NAME` or `NAME:sim` for a simulated one.
    #[arg(long = "device", value_name = "NAME[:sim]", required = true)]
    devices: Vec<String>,

    /// Admin protocol listen address.
    #[arg(long, value_name = "ADDR")]
    admin_addr: Option<std::net::SocketAddr>,

    /// Root under which disks are mounted and exported.
    #[arg(long, value_name = "DIR")]
    mount_root: Option<std::path::PathBuf>,

    /// Directory holding the mailbox slots.
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<std::path::PathBuf>,

    /// Heartbeat interval in seconds.
    #[arg(long, value_name = "SECONDS")]
    heartbeat: Option<u64>,

    /// Statistics poll interval in seconds.
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
    if let Some(addr) = args.admin_addr {
        cfg.admin_addr = addr;
    }
    if let Some(root) = args.mount_root {
        cfg.mount_root = root;
    }
    if let Some(dir) = args.runtime_dir {
        cfg.runtime_dir = dir;
    }
    if let Some(secs) = args.heartbeat {
        cfg.heartbeat = std::time::Duration::from_secs(secs.max(1));
    }
    if let Some(secs) = args.poll {
        cfg.poll = std::time::Duration::from_secs(secs.max(1));
    }

    let specs = args
        .devices
        .iter()
        .map(|raw| raw.parse::<DiskSpec>().map_err(anyhow::Error::msg))
        .collect::<anyhow::Result<Vec<_>>>()
        .context("bad --device flag")?;

    let channel = Arc::new(
        FileChannel::open(&cfg.runtime_dir, &cfg.mailbox, cfg.channel_capacity)
            .with_context(|| format!("opening mailbox {:?}", cfg.mailbox))?,
    );
    let actions = SlotActions::new(channel.clone(), cfg.command_poll);
    let tool = Arc::new(SystemDiskTool::new(cfg.short_timeout, cfg.long_timeout));
    let manager = DiskManager::new(
        channel.clone(),
        tool,
        &specs,
        &cfg.mount_root,
        cfg.thresholds,
        cfg.health_every,
    );
    let admin = AdminServer::bind(cfg.admin_addr)
        .await
        .with_context(|| format!("binding admin listener on {}", cfg.admin_addr))?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if wait_for_termination().await.is_ok() {
            signal_token.cancel();
        }
    });

    let runtime = ServiceRuntime::new(
        channel,
        manager,
        Box::new(actions),
        Some(admin),
        cfg.runtime_options(),
    );
    runtime.run(token).await;
    Ok(())
}
