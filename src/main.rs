//! NFS Subdirectory Provisioner
//!
//! The provisioning control loop links this crate as a library and drives
//! [`nfs_subdir_provisioner::Provisioner`] itself. This binary only validates
//! the configuration, checks that the API server is reachable and serves
//! health endpoints until shutdown.

use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nfs_subdir_provisioner::config::{parse_bool_setting, parse_default_on_delete};
use nfs_subdir_provisioner::{Error, PolicyDefaults, ProvisionerConfig, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NFS Subdirectory Provisioner - dynamic PersistentVolumes on an NFS export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NFS server address
    #[arg(long, env = "NFS_SERVER")]
    nfs_server: Option<String>,

    /// Exported path on the NFS server
    #[arg(long, env = "NFS_PATH")]
    nfs_path: Option<String>,

    /// Local mount point of the export
    #[arg(long, env = "NFS_MOUNT_PATH", default_value = nfs_subdir_provisioner::DEFAULT_MOUNT_PATH)]
    mount_path: String,

    /// Provisioner name referenced by StorageClasses
    #[arg(long, env = "PROVISIONER_NAME")]
    provisioner_name: Option<String>,

    /// Enable leader election in the control loop (default true)
    #[arg(long, env = "ENABLE_LEADER_ELECTION")]
    enable_leader_election: Option<String>,

    /// Default onDelete policy (delete or retain)
    #[arg(long, env = "PROVISIONER_ON_DELETE")]
    on_delete: Option<String>,

    /// Default archiveOnDelete policy
    #[arg(long, env = "PROVISIONER_ARCHIVE_ON_DELETE")]
    archive_on_delete: Option<String>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn provisioner_config(&self) -> Result<ProvisionerConfig> {
        let defaults = PolicyDefaults {
            on_delete: parse_default_on_delete("PROVISIONER_ON_DELETE", self.on_delete.as_deref())?,
            archive_on_delete: parse_bool_setting(
                "PROVISIONER_ARCHIVE_ON_DELETE",
                self.archive_on_delete.as_deref(),
            )?,
        };
        let leader_election =
            parse_bool_setting("ENABLE_LEADER_ELECTION", self.enable_leader_election.as_deref())?
                .unwrap_or(true);

        let mut config = ProvisionerConfig::new(
            self.nfs_server.clone().unwrap_or_default(),
            self.nfs_path.clone().unwrap_or_default(),
            self.provisioner_name.clone().unwrap_or_default(),
        )
        .with_mount_path(&self.mount_path)
        .with_defaults(defaults);
        config.leader_election = leader_election;

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = args.provisioner_config()?;

    info!("Starting NFS Subdirectory Provisioner");
    info!("  Version: {}", nfs_subdir_provisioner::VERSION);
    info!("  Provisioner: {}", config.provisioner_name);
    info!("  Server: {}:{}", config.server, config.export_path);
    info!("  Mount path: {}", config.mount_path.display());
    info!("  Leader election: {}", config.leader_election);
    info!("  Default onDelete: {}", config.defaults.on_delete);
    info!("  Default archiveOnDelete: {:?}", config.defaults.archive_on_delete);

    let client = kube::Client::try_default().await?;
    let version = client.apiserver_version().await?;
    info!("Connected to Kubernetes API server {}", version.git_version);

    tokio::select! {
        result = run_health_server(&args.health_addr) => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    info!("Provisioner shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,kube=info,tower=warn", level))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => Response::new(Body::from("ok")),
                _ => {
                    let mut response = Response::new(Body::from("not found"));
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    response
                }
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Unable to bind health server: {}", e)))?
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}
