use clap::{Parser, Subcommand};
use peerwatch_core::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

#[cfg(feature = "tui")]
use peerwatch_tui::{run_tui, App};

#[derive(Parser)]
#[command(name = "peerwatch")]
#[command(about = "Watch and drive a peer-to-peer node through its HTTP status API")]
#[command(version = "0.1.0")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend port on the configured host
    #[arg(short, long, conflicts_with = "url")]
    port: Option<String>,

    /// Backend base URL, or a client URL carrying a `port` query parameter
    #[arg(short, long)]
    url: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the TUI interface
    #[cfg(feature = "tui")]
    Tui,

    /// Show the node's address, peers, files and transfers
    Status,

    /// Connect the node to a peer multiaddr
    Connect {
        /// Multiaddr of the peer
        addr: String,
    },

    /// Broadcast a chat message to all peers
    Broadcast {
        /// Message text
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Send a file to a peer
    Send {
        peer_id: String,
        path: PathBuf,
    },

    /// Download a received file
    Download {
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the TUI log
    Logs {
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },

    /// Generate default configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // The TUI owns the terminal, so its logs go to a file.
    if runs_tui(&args.command) {
        let log_path = log_file_path()?;
        if let Some(dir) = log_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(Mutex::new(log_file))
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    // Handle config command first, before trying to load config
    if let Some(Commands::Config) = args.command {
        let config = PeerwatchConfig::default();
        let config_path = match &args.config {
            Some(path) => {
                config.save_to(path).await?;
                path.clone()
            }
            None => {
                config.save().await?;
                PeerwatchConfig::config_path()?
            }
        };
        println!("Generated default config at: {}", config_path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => PeerwatchConfig::load_from(path).await?,
        None => PeerwatchConfig::load().await?,
    };
    let location = resolve_location(&args, &config)?;
    info!("Using backend {}", location);

    let client = Arc::new(PeerClient::with_http(config, location));

    match args.command {
        #[cfg(feature = "tui")]
        Some(Commands::Tui) | None => {
            run_tui(App::new(client).with_system_clipboard()).await?;
        }

        #[cfg(not(feature = "tui"))]
        None => {
            use clap::CommandFactory;
            Args::command().print_help()?;
            println!();
        }

        Some(Commands::Status) => {
            client.refresh_all().await?;
            print_status(&client.snapshot());
        }

        Some(Commands::Connect { addr }) => {
            client.connect(&addr).await?;
            println!("Successfully connected to peer");
        }

        Some(Commands::Broadcast { message }) => {
            client.broadcast(&message.join(" ")).await?;
            println!("Message sent");
        }

        Some(Commands::Send { peer_id, path }) => {
            let handle = client.send_file(&peer_id, &path).await?;
            let mut progress = client.tracker().subscribe();
            let outcome = handle.finished();
            tokio::pin!(outcome);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut outcome => break outcome,
                    changed = progress.changed() => {
                        if changed.is_err() {
                            break (&mut outcome).await;
                        }
                        if let Some(send) = progress.borrow_and_update().get(&peer_id) {
                            println!("Sending: {:.1}%", send.percent);
                        }
                    }
                }
            };

            match outcome {
                SendOutcome::Completed => {
                    println!("File {} sent to {}", path.display(), short_peer_id(&peer_id))
                }
                SendOutcome::Failed(reason) => {
                    return Err(PeerwatchError::Other(format!("Send failed: {}", reason)))
                }
            }
        }

        Some(Commands::Download { name, output }) => {
            let saved = client.download(&name, output.as_deref()).await?;
            println!("Saved \"{}\" to {}", name, saved.display());
        }

        Some(Commands::Logs { lines }) => {
            show_logs(lines).await?;
        }

        Some(Commands::Config) => {
            // This is handled earlier in main() before config loading
            unreachable!("Config command should be handled before this match")
        }
    }

    Ok(())
}

fn runs_tui(command: &Option<Commands>) -> bool {
    #[cfg(feature = "tui")]
    {
        matches!(command, None | Some(Commands::Tui))
    }
    #[cfg(not(feature = "tui"))]
    {
        let _ = command;
        false
    }
}

fn resolve_location(args: &Args, config: &PeerwatchConfig) -> Result<BackendLocation> {
    if let Some(url) = &args.url {
        let has_port_param = url::Url::parse(first_token(url))
            .map(|u| u.query_pairs().any(|(key, _)| key == "port"))
            .unwrap_or(false);
        return if has_port_param {
            BackendLocation::from_client_url(url)
        } else {
            BackendLocation::from_base(url)
        };
    }
    let port = args
        .port
        .clone()
        .unwrap_or_else(|| config.backend.port.to_string());
    BackendLocation::from_port(&config.backend.host, Some(&port))
}

fn print_status(snapshot: &Snapshot) {
    println!("Peerwatch Status");
    println!(
        "Node: {}",
        snapshot.local_addr.as_deref().unwrap_or("Loading...")
    );

    println!("Connected peers: {}", snapshot.peers.len());
    for peer in &snapshot.peers {
        println!("  - {}", peer.id);
        for addr in &peer.addresses {
            println!("      {}", addr);
        }
    }

    println!("Received files: {}", snapshot.files.len());
    for file in &snapshot.files {
        println!(
            "  - {} ({} bytes) from {}",
            file.name,
            file.size,
            short_peer_id(&file.from)
        );
    }

    if !snapshot.transfers.is_empty() {
        println!("Transfers:");
        for transfer in snapshot.transfers.values() {
            let verb = match transfer.direction {
                Direction::Sending => "Sending",
                Direction::Receiving => "Receiving",
            };
            println!(
                "  - {} {}: {:.1}%",
                transfer.key, verb, transfer.percent
            );
        }
    }

    println!("Messages: {}", snapshot.messages.len());
    for message in snapshot.messages.iter().rev().take(5).rev() {
        let author = if snapshot.is_local(&message.from) {
            "You".to_string()
        } else {
            short_peer_id(&message.from)
        };
        println!("  {}: {}", author, message.content);
    }
}

async fn show_logs(lines: usize) -> Result<()> {
    let log_path = log_file_path()?;

    if !log_path.exists() {
        println!("Log file not found: {}", log_path.display());
        println!("The TUI may not have been started yet.");
        return Ok(());
    }

    let content = tokio::fs::read_to_string(&log_path).await?;
    let lines_vec: Vec<&str> = content.lines().collect();
    let start = lines_vec.len().saturating_sub(lines);

    println!("Last {} lines from {}", lines, log_path.display());
    println!("---");
    for line in &lines_vec[start..] {
        println!("{}", line);
    }

    Ok(())
}
