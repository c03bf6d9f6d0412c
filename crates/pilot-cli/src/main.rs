//! Pilot launcher CLI
//!
//! Talks to a running `pilot-daemon` over its remote control port: lists and
//! uploads device sets, starts and stops servers, and follows the log.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use pilot_rpc::commands::{CommandName, CommandResponse, Metadata, events, keys};
use pilot_rpc::protocol::{Message, Notification};
use pilot_rpc::{RpcClient, daemon_address};
use serde_json::Value;

/// Pilot launcher CLI
#[derive(Parser)]
#[command(name = "pilot")]
#[command(about = "Control a Pilot server launcher")]
#[command(version)]
#[command(after_help = "\
Examples:
  pilot list                          List device sets on the launcher
  pilot add ./setup.xml               Upload a device set
  pilot start setup.xml --log-level 4 Start a server with DEBUG output
  pilot running                       Show running servers
  pilot logs                          Follow launcher and server logs
")]
struct Cli {
    /// Daemon address (defaults to `$PILOT_ADDRESS` or 127.0.0.1:18904)
    #[arg(long, global = true, value_name = "HOST:PORT")]
    address: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List device-set files on the launcher
    List,

    /// Upload a device-set file
    Add {
        /// Local file to upload
        file: PathBuf,

        /// Name to store it under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Start a server for a device set
    Start {
        /// Device-set file name
        name: String,

        /// Server verbosity (1=ERROR .. 5=TRACE)
        #[arg(long, value_name = "N")]
        log_level: Option<i32>,
    },

    /// Stop the server for a device set
    Stop {
        /// Device-set file name
        name: String,
    },

    /// Show running servers
    Running,

    /// Follow log messages and server events until interrupted
    Logs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let address = cli.address.unwrap_or_else(daemon_address);

    let client = RpcClient::connect_to(&address)
        .await
        .with_context(|| format!("Failed to connect to launcher at {address}. Is it running?"))?;

    match cli.command {
        Commands::List => run_list(&client).await,
        Commands::Add { file, name } => run_add(&client, &file, name.as_deref()).await,
        Commands::Start { name, log_level } => run_start(&client, &name, log_level).await,
        Commands::Stop { name } => run_stop(&client, &name).await,
        Commands::Running => run_running(&client).await,
        Commands::Logs => run_logs(client).await,
    }
}

fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

async fn send(
    client: &RpcClient,
    command: CommandName,
    metadata: &Metadata,
) -> Result<CommandResponse> {
    let response = client
        .send(command, metadata)
        .await
        .with_context(|| format!("{command} request failed"))?;
    Ok(response.into_result(command.as_str())?)
}

async fn run_list(client: &RpcClient) -> Result<()> {
    let response = send(client, CommandName::GetConfigFiles, &Metadata::new()).await?;
    let files = response.list(keys::CONFIG_FILES);
    if files.is_empty() {
        println!("No device sets found.");
    }
    for file in files {
        println!("{file}");
    }
    Ok(())
}

/// Name an upload is stored under.
fn upload_name(file: &Path, name: Option<&str>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name.to_string());
    }
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", file.display()))
}

async fn run_add(client: &RpcClient, file: &Path, name: Option<&str>) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = upload_name(file, name)?;

    let response = send(
        client,
        CommandName::AddConfigFile,
        &metadata(&[
            (keys::CONFIG_FILE_NAME, name.as_str()),
            (keys::CONFIG_FILE_CONTENT, content.as_str()),
        ]),
    )
    .await?;

    let stored = response.get(keys::CONFIG_FILE_NAME).unwrap_or(name.as_str());
    println!("Uploaded as {stored}");
    Ok(())
}

async fn run_start(client: &RpcClient, name: &str, log_level: Option<i32>) -> Result<()> {
    let mut request = metadata(&[(keys::CONFIG_FILE_NAME, name)]);
    if let Some(level) = log_level {
        request.insert(keys::LOG_LEVEL.to_string(), level.to_string());
    }

    let response = send(client, CommandName::StartServer, &request).await?;
    println!("Server started for {name}");
    let servers = response.list(keys::SERVERS);
    if !servers.is_empty() {
        println!("Endpoints: {}", servers.join(", "));
    }
    Ok(())
}

async fn run_stop(client: &RpcClient, name: &str) -> Result<()> {
    send(
        client,
        CommandName::StopServer,
        &metadata(&[(keys::CONFIG_FILE_NAME, name)]),
    )
    .await?;
    println!("Server stopped for {name}");
    Ok(())
}

async fn run_running(client: &RpcClient) -> Result<()> {
    let response = send(client, CommandName::GetRunningServers, &Metadata::new()).await?;
    let running = response.list(keys::RUNNING_SERVERS);
    if running.is_empty() {
        println!("No servers running.");
        return Ok(());
    }

    let ready = response.list(keys::READY_SERVERS);
    for name in running {
        let state = if ready.contains(&name) { "ready" } else { "starting" };
        println!("{name:<32} {state}");
    }
    Ok(())
}

fn param<'a>(params: Option<&'a Value>, key: &str) -> &'a str {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// One line of `pilot logs` output, `None` for notifications it ignores.
fn format_notification(notification: &Notification) -> Option<String> {
    let params = notification.params.as_ref();
    match notification.method.as_str() {
        events::LOG_MESSAGE => Some(format!(
            "[{}] {:<7} {}",
            param(params, keys::ORIGIN),
            param(params, keys::LOG_LEVEL),
            param(params, keys::MESSAGE)
        )),
        events::SERVER_STARTED => {
            let servers = param(params, keys::SERVERS);
            Some(format!(
                "== Server started: {} (verbosity {}){}",
                param(params, keys::CONFIG_FILE_NAME),
                param(params, keys::LOG_LEVEL),
                if servers.is_empty() {
                    String::new()
                } else {
                    format!(" on {servers}")
                }
            ))
        }
        events::SERVER_STOPPED => Some(format!(
            "== Server stopped: {}",
            param(params, keys::CONFIG_FILE_NAME)
        )),
        _ => None,
    }
}

async fn run_logs(mut client: RpcClient) -> Result<()> {
    send(&client, CommandName::LogSubscribe, &Metadata::new()).await?;
    eprintln!("Following launcher logs, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = client.recv() => match message {
                Some(Message::Notification(notification)) => {
                    if let Some(line) = format_notification(&notification) {
                        println!("{line}");
                    }
                }
                Some(_) => {}
                None => {
                    eprintln!("Launcher closed the connection");
                    return Ok(());
                }
            },
        }
    }

    send(&client, CommandName::LogUnsubscribe, &Metadata::new()).await?;
    Ok(())
}
