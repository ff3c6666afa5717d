//! `emergency-gate` command-line entry point.

use clap::{Args, Parser, Subcommand};
use emergency_gate::audit::JsonlFileSink;
use emergency_gate::config::{parse_allowed_ips, AuditConfig, DEFAULT_BIND_ADDR};
use emergency_gate::crypto::totp;
use emergency_gate::{
    Clock, EmergencyKey, GatewayConfig, GatewayError, OverrideAction, OverrideClient,
    OverrideGateway, RateLimitPolicy, SystemClock,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emergency-gate")]
#[command(about = "Emergency override authentication and audit gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP gateway")]
    Serve(ServeArgs),

    #[command(about = "Send a signed override to a running gateway")]
    Trigger {
        #[arg(help = "SAFE_MODE, SHUTDOWN or NORMAL")]
        action: OverrideAction,

        #[command(flatten)]
        target: TargetArgs,
    },

    #[command(about = "Show the status of a running gateway")]
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },

    #[command(about = "Print the current TOTP code")]
    Totp {
        #[command(flatten)]
        key: KeyArgs,
    },

    #[command(about = "Audit trail housekeeping")]
    Audit {
        #[command(subcommand)]
        cmd: AuditCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    #[command(about = "Remove records older than the retention horizon")]
    Prune {
        #[arg(long, env = "EMERGENCY_AUDIT_PATH")]
        path: Option<PathBuf>,

        #[arg(long, default_value_t = 90)]
        retention_days: u64,
    },
}

#[derive(Args)]
struct KeyArgs {
    #[arg(long = "key", env = "EMERGENCY_KEY", hide_env_values = true)]
    emergency_key: String,
}

impl KeyArgs {
    fn parse_key(&self) -> Result<EmergencyKey, GatewayError> {
        EmergencyKey::new(self.emergency_key.clone())
    }
}

#[derive(Args)]
struct TargetArgs {
    #[arg(long, env = "EMERGENCY_GATEWAY_URL", default_value = "http://127.0.0.1:8700")]
    url: String,

    #[command(flatten)]
    key: KeyArgs,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    key: KeyArgs,

    #[arg(long, env = "EMERGENCY_ALLOWED_IPS", default_value = "127.0.0.1,::1")]
    allowed_ips: String,

    #[arg(long, env = "EMERGENCY_BIND", default_value = DEFAULT_BIND_ADDR)]
    bind: SocketAddr,

    #[arg(long, env = "EMERGENCY_AUDIT_PATH")]
    audit_path: Option<PathBuf>,

    #[arg(long, env = "EMERGENCY_AUDIT_QUEUE", default_value_t = 1024)]
    audit_queue: usize,

    #[arg(long, env = "EMERGENCY_RATE_MAX_ATTEMPTS", default_value_t = 3)]
    rate_max_attempts: usize,

    #[arg(long, env = "EMERGENCY_RATE_WINDOW_SECS", default_value_t = 900)]
    rate_window_secs: u64,
}

impl ServeArgs {
    fn into_config(self) -> Result<GatewayConfig, GatewayError> {
        let config = GatewayConfig {
            emergency_key: self.key.parse_key()?,
            allowed_ips: parse_allowed_ips(&self.allowed_ips),
            rate_limit: RateLimitPolicy {
                max_attempts: self.rate_max_attempts,
                window: Duration::from_secs(self.rate_window_secs),
            },
            audit: AuditConfig {
                path: self.audit_path,
                queue_capacity: self.audit_queue,
                ..AuditConfig::default()
            },
            bind_addr: self.bind,
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    // Load .env if present so EMERGENCY_* can live next to the binary.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GatewayError> {
    match cli.command {
        Commands::Serve(args) => serve(args),
        Commands::Trigger { action, target } => {
            let client = OverrideClient::new(target.url, target.key.parse_key()?)?;
            let receipt = client.submit(action)?;
            println!("{}", receipt.message);
            Ok(())
        }
        Commands::Status { target } => {
            let client = OverrideClient::new(target.url, target.key.parse_key()?)?;
            let status = client.status()?;
            let json = serde_json::to_string_pretty(&status)
                .map_err(|e| GatewayError::ProtocolError(format!("Failed to render status: {}", e)))?;
            println!("{}", json);
            Ok(())
        }
        Commands::Totp { key } => {
            let key = key.parse_key()?;
            let code = totp::generate_at(key.as_bytes(), SystemClock.unix_seconds())?;
            println!("{}", code);
            Ok(())
        }
        Commands::Audit {
            cmd: AuditCommands::Prune {
                path,
                retention_days,
            },
        } => {
            let sink = match path {
                Some(path) => JsonlFileSink::new(path)?,
                None => JsonlFileSink::with_namespace(&AuditConfig::default().namespace)?,
            };
            let retention = AuditConfig::retention_from_days(retention_days)?;
            let removed = sink.prune_expired(retention, SystemClock.now_utc())?;
            tracing::info!(removed, path = %sink.path().display(), "audit trail pruned");
            println!("removed {} record(s)", removed);
            Ok(())
        }
    }
}

fn serve(args: ServeArgs) -> Result<(), GatewayError> {
    let config = args.into_config()?;
    let addr = config.bind_addr;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| GatewayError::ServerIO(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(async move {
        let gateway = Arc::new(OverrideGateway::open(config)?);
        emergency_gate::server::serve(gateway, addr).await
    })
}
