//! Thread leader binary.
//!
//! Runs the Network Data authority on a single-threaded event loop: requests
//! arrive as UDP datagrams, and the commissioner session timer fires from the
//! same loop.

use anyhow::Context;
use clap::Parser;
use netdata_leader::{
    CommissionerSession, FixedRole, Leader, LocatorSource, Request, RlocLocatorSource, RoleOracle,
};
use netdata_store::NetworkData;
use netdata_wire::MAX_NETWORK_DATA_SIZE;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::LeaderConfig;
use logging::LeaderLogFormatter;

/// Thread leader: Network Data authority and commissioner arbitration
#[derive(Parser, Debug)]
#[command(name = "thread-leader", version, about = "Thread leader Network Data authority")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// UDP listen address, e.g. [::]:19789
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Start without the leader role
    #[arg(long)]
    follower: bool,

    /// Commissioner session timeout, e.g. 50s
    #[arg(long)]
    petition_timeout: Option<humantime::Duration>,

    /// Mesh-local prefix, e.g. fd00:db8::
    #[arg(long)]
    mesh_local_prefix: Option<Ipv6Addr>,
}

impl Args {
    fn apply(&self, config: &mut LeaderConfig) {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if self.follower {
            config.is_leader = false;
        }
        if let Some(timeout) = self.petition_timeout {
            config.petition_timeout = timeout.into();
        }
        if let Some(prefix) = self.mesh_local_prefix {
            config.mesh_local_prefix = Some(prefix);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut env_filter = EnvFilter::new("info");
    for target in ["thread_leader", "netdata_wire", "netdata_store", "netdata_leader"] {
        env_filter = env_filter.add_directive(format!("{}={}", target, args.log_level).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(LeaderLogFormatter::new("leader"))
        .init();

    info!("Starting Thread leader v{}", env!("CARGO_PKG_VERSION"));

    let mut config = LeaderConfig::load_from_file(&args.config)?;
    args.apply(&mut config);

    let socket = UdpSocket::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    let locator = match config.mesh_local_prefix_bytes() {
        Some(prefix) => RlocLocatorSource::with_mesh_local_prefix(prefix),
        None => RlocLocatorSource::new(),
    };
    let mut leader = Leader::new(
        NetworkData::new(),
        CommissionerSession::new(config.petition_timeout),
        FixedRole::new(config.is_leader),
        locator,
    );

    component_info!(
        "udp",
        "Listening on {} leader={}",
        socket.local_addr()?,
        config.is_leader
    );

    // One byte of kind, a full batch, and one more to detect oversized batches
    let mut buf = vec![0u8; MAX_NETWORK_DATA_SIZE + 2];

    loop {
        let deadline = leader.next_deadline();

        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, from) = received.context("UDP receive failed")?;
                serve(&mut leader, &socket, &buf[..len], from).await;
            }

            _ = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                if leader.handle_timer(Instant::now()) {
                    component_info!("session", "Commissioner session timed out");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    info!("Thread leader stopped");
    Ok(())
}

async fn serve<R: RoleOracle, L: LocatorSource>(
    leader: &mut Leader<R, L>,
    socket: &UdpSocket,
    datagram: &[u8],
    from: SocketAddr,
) {
    let request = match Request::decode(datagram) {
        Ok(request) => request,
        Err(err) => {
            component_warn!("udp", "Dropping datagram from {}: {}", from, err);
            return;
        }
    };

    let peer = match from.ip() {
        IpAddr::V6(addr) => addr,
        IpAddr::V4(addr) => addr.to_ipv6_mapped(),
    };
    let response = leader.handle(&request, &peer, Instant::now());

    if let Some(snapshot) = &response.snapshot {
        match serde_json::to_string(snapshot) {
            Ok(json) => component_info!("netdata", "Network data updated {}", json),
            Err(err) => component_warn!("netdata", "Failed to serialize snapshot: {}", err),
        }
    }

    let Some(reply) = response.to_datagram(request.kind) else {
        component_debug!("udp", "No response to {:?} from {}", request.kind, from);
        return;
    };
    if let Err(err) = socket.send_to(&reply, from).await {
        component_warn!("udp", "Failed to reply to {}: {}", from, err);
    }
}
