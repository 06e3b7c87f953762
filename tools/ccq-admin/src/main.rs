//! CCQ-Admin: operator tool for the cross-chain query gateway
//!
//! Checks permission files, dry-runs authorization decisions, looks up the
//! current guardian set and watches a permissions file for reloads.

mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use ccq_query_auth::domain::AuthConfig;
use ccq_query_auth::{
    authorize, fetch_guardian_set_with_timeout, load_permissions, PermissionStore,
    PermissionWatcher, SignedQueryRequest,
};

/// CCQ-Admin: cross-chain query gateway operator tool
#[derive(Parser, Debug)]
#[command(name = "ccq-admin", version)]
#[command(about = "Inspect CCQ permissions and guardian sets")]
struct Cli {
    /// JSON configuration file; command line flags override its values
    #[arg(long, env = "CCQ_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a permissions file and summarize it
    CheckPermissions {
        /// Permissions file
        #[arg(long, env = "CCQ_PERMISSIONS_FILE")]
        file: Option<PathBuf>,
    },

    /// Run the authorizer on an encoded query request
    Authorize {
        /// Permissions file
        #[arg(long, env = "CCQ_PERMISSIONS_FILE")]
        file: Option<PathBuf>,

        /// API key presented by the client
        #[arg(long)]
        api_key: String,

        /// Encoded query request, hex
        #[arg(long)]
        request: String,

        /// Client signature, hex
        #[arg(long, default_value = "")]
        signature: String,
    },

    /// Read the current guardian set from the core bridge
    GuardianSet {
        /// JSON-RPC endpoint
        #[arg(long, env = "CCQ_RPC_URL")]
        rpc_url: Option<String>,

        /// Core bridge contract address
        #[arg(long, env = "CCQ_CORE_BRIDGE")]
        core_bridge: Option<String>,

        /// Resolution budget in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Reload a permissions file whenever it changes, until Ctrl-C
    Watch {
        /// Permissions file
        #[arg(long, env = "CCQ_PERMISSIONS_FILE")]
        file: Option<PathBuf>,

        /// Seconds between modification checks
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    telemetry::init_tracing(&config.telemetry)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(run(cli.command, config))
}

/// Merge the optional config file with command line overrides.
fn build_config(cli: &Cli) -> Result<AuthConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => AuthConfig::default(),
    };

    if let Some(level) = &cli.log_level {
        config.telemetry.log_level = level.clone();
    }
    if cli.json_logs {
        config.telemetry.json_logs = true;
    }

    match &cli.command {
        Command::CheckPermissions { file } | Command::Authorize { file, .. } => {
            if let Some(file) = file {
                config.permissions_file = file.clone();
            }
        }
        Command::Watch {
            file,
            interval_secs,
        } => {
            if let Some(file) = file {
                config.permissions_file = file.clone();
            }
            config.reload.enabled = true;
            if let Some(secs) = interval_secs {
                config.reload.poll_interval_secs = *secs;
            }
        }
        Command::GuardianSet {
            rpc_url,
            core_bridge,
            timeout_secs,
        } => {
            if rpc_url.is_some() {
                config.guardian.rpc_url = rpc_url.clone();
            }
            if core_bridge.is_some() {
                config.guardian.core_bridge_address = core_bridge.clone();
            }
            if let Some(secs) = timeout_secs {
                config.guardian.timeout_secs = *secs;
            }
        }
    }

    Ok(config)
}

async fn run(command: Command, config: AuthConfig) -> Result<ExitCode> {
    match command {
        Command::CheckPermissions { .. } => check_permissions(&config),
        Command::Authorize {
            api_key,
            request,
            signature,
            ..
        } => authorize_request(&config, &api_key, &request, &signature),
        Command::GuardianSet { .. } => guardian_set(&config).await,
        Command::Watch { .. } => watch(&config).await,
    }
}

fn check_permissions(config: &AuthConfig) -> Result<ExitCode> {
    config.validate()?;
    let table = load_permissions(&config.permissions_file)?;

    let mut users: Vec<_> = table
        .entries()
        .map(|entry| {
            json!({
                "userName": entry.user_name(),
                "allowedCalls": entry.allowed_call_count(),
            })
        })
        .collect();
    users.sort_by(|a, b| a["userName"].as_str().cmp(&b["userName"].as_str()));

    print_json(&json!({
        "file": config.permissions_file.display().to_string(),
        "apiKeys": table.len(),
        "users": users,
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn authorize_request(
    config: &AuthConfig,
    api_key: &str,
    request: &str,
    signature: &str,
) -> Result<ExitCode> {
    config.validate()?;
    let table = load_permissions(&config.permissions_file)?;

    let signed = SignedQueryRequest::new(
        decode_hex(request).context("--request is not valid hex")?,
        decode_hex(signature).context("--signature is not valid hex")?,
    );

    match authorize(api_key, &signed, &table) {
        Ok(authorized) => {
            print_json(&json!({
                "authorized": true,
                "userName": authorized.user_name,
                "nonce": authorized.request.nonce,
                "perChainQueries": authorized.request.per_chain_queries.len(),
                "calls": authorized.call_count,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_json(&json!({
                "authorized": false,
                "reason": e.reason_code(),
                "error": e.to_string(),
            }))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn guardian_set(config: &AuthConfig) -> Result<ExitCode> {
    let resolver = &config.guardian;
    resolver.validate()?;
    let (Some(rpc_url), Some(core_bridge)) = (&resolver.rpc_url, &resolver.core_bridge_address)
    else {
        bail!("guardian-set needs --rpc-url and --core-bridge");
    };

    let set = fetch_guardian_set_with_timeout(rpc_url, core_bridge, resolver.timeout()).await?;
    print_json(&json!({
        "index": set.index,
        "quorum": set.quorum(),
        "keys": set.keys,
    }))?;
    Ok(ExitCode::SUCCESS)
}

async fn watch(config: &AuthConfig) -> Result<ExitCode> {
    config.validate()?;
    let store = Arc::new(PermissionStore::open(&config.permissions_file)?);
    info!(
        path = %config.permissions_file.display(),
        api_keys = store.snapshot().len(),
        interval_secs = config.reload.poll_interval_secs,
        "Watching permissions file"
    );

    let watcher = PermissionWatcher::spawn(Arc::clone(&store), config.reload.poll_interval());
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    watcher.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let input = input.trim();
    hex::decode(input.strip_prefix("0x").unwrap_or(input))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ccq-admin").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_enables_reload() {
        let cli = parse(&["watch", "--file", "perms.json", "--interval-secs", "3"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.permissions_file, PathBuf::from("perms.json"));
        assert!(config.reload.enabled);
        assert_eq!(config.reload.poll_interval_secs, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_guardian_set_flags() {
        let cli = parse(&[
            "--json-logs",
            "guardian-set",
            "--rpc-url",
            "http://localhost:8545",
            "--core-bridge",
            "0x98f3c9e6E3fAce36bAAd05FE09d375Ef1464288B",
        ]);
        let config = build_config(&cli).unwrap();
        assert!(config.telemetry.json_logs);
        assert_eq!(config.guardian.timeout_secs, 5);
        assert!(config.guardian.is_configured());
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ccq.json");
        std::fs::write(
            &path,
            r#"{"permissions_file": "from-config.json", "telemetry": {"log_level": "debug"}}"#,
        )
        .unwrap();

        let config_arg = path.display().to_string();
        let cli = parse(&["--config", &config_arg, "check-permissions"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.permissions_file, PathBuf::from("from-config.json"));
        assert_eq!(config.telemetry.log_level, "debug");

        let cli = parse(&[
            "--config",
            &config_arg,
            "--log-level",
            "warn",
            "check-permissions",
            "--file",
            "cli.json",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.permissions_file, PathBuf::from("cli.json"));
        assert_eq!(config.telemetry.log_level, "warn");
    }

    #[test]
    fn test_decode_hex_accepts_prefix() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_hex("0102").unwrap(), vec![1, 2]);
        assert!(decode_hex("").unwrap().is_empty());
        assert!(decode_hex("zz").is_err());
    }
}
