use std::collections::HashSet;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::Config;
use crate::context::AppContext;
use crate::discovery::DiscoveredService;
use crate::files::FileAccessor;
use crate::handshake::{HandshakeClient, HandshakeServer};
use crate::sync::{SyncEngine, SyncEvent, SyncSideEffect, SyncState};

#[derive(Parser)]
#[command(name = "lansync")]
#[command(about = "Local-network discovery and sync orchestrator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the orchestrator until Ctrl-C")]
    Run {
        /// Announce this device on start
        #[arg(short, long)]
        register: bool,

        /// Browse for peers on start
        #[arg(short, long)]
        scan: bool,

        /// Send a handshake to every newly resolved peer
        #[arg(short, long)]
        greet: bool,

        /// Print state snapshots as JSON
        #[arg(long)]
        json: bool,
    },

    #[command(about = "Serve the handshake endpoint only")]
    Serve,

    #[command(about = "Send one handshake to a peer")]
    Hello { ip: IpAddr, port: u16 },

    #[command(about = "Sandboxed file access")]
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum FilesAction {
    #[command(about = "Print a file below the files root")]
    Read { path: String },

    #[command(about = "List a directory below the files root")]
    List {
        #[arg(default_value = "/")]
        path: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Validate configuration")]
    Validate,
}

pub struct CliHandler {
    config: Arc<Config>,
    config_path: Option<PathBuf>,
}

impl CliHandler {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Arc::new(Config::load_config(config_path.clone())?);
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn handle_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Run {
                register,
                scan,
                greet,
                json,
            } => self.run(register, scan, greet, json).await,
            Commands::Serve => self.serve().await,
            Commands::Hello { ip, port } => self.hello(ip, port).await,
            Commands::Files { action } => self.handle_files_action(action),
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn run(&self, register: bool, scan: bool, greet: bool, json: bool) -> Result<()> {
        let ctx = AppContext::mdns(Config::clone(&self.config))?;
        let mut engine = SyncEngine::start(&ctx).await?;
        if let Some(addr) = engine.server_addr() {
            println!("Handshake server listening on http://{}", addr);
        }

        // One event per debounce window; closer ones would be coalesced
        let window = self.config.debounce();
        if register {
            engine.send(SyncEvent::RegisterOn);
            if scan {
                tokio::time::sleep(window + window / 10).await;
            }
        }
        if scan {
            engine.send(SyncEvent::ScanOn);
        }

        let interrupted = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        };
        follow(&engine, interrupted, greet, json).await?;

        engine.shutdown().await;
        if engine.current_state().registered {
            if let Err(e) = ctx.publisher.unregister().await {
                warn!("Failed to unregister on exit: {}", e);
            }
        }
        ctx.shutdown();
        Ok(())
    }

    async fn serve(&self) -> Result<()> {
        let handshake = &self.config.handshake;
        let mut server = HandshakeServer::new(handshake.bind_addr, handshake.port);
        let addr = server.start().await?;
        println!("Handshake server listening on http://{}", addr);

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        server.stop().await;
        Ok(())
    }

    async fn hello(&self, ip: IpAddr, port: u16) -> Result<()> {
        let addr = SocketAddr::new(ip, port);
        let mut target = DiscoveredService::stub(addr.to_string(), addr.to_string());
        target.port = port;
        target.addresses = vec![ip];

        let mut client = HandshakeClient::new();
        client.start();
        println!("{}", client.head_shake(&target).await);
        Ok(())
    }

    fn handle_files_action(&self, action: FilesAction) -> Result<()> {
        let files = FileAccessor::new(&self.config.files.root)?;
        match action {
            FilesAction::Read { path } => {
                print!("{}", files.read(&path)?);
            }
            FilesAction::List { path } => {
                let mut entries = files.list(&path)?;
                entries.sort();
                for entry in entries {
                    println!("{}", entry);
                }
            }
        }
        Ok(())
    }

    fn handle_config_action(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("Current Configuration:");
                print!("{}", toml::to_string_pretty(self.config.as_ref())?);
            }
            ConfigAction::Init { force } => {
                let path = Config::generate_example_config(force)?;
                println!("Example configuration written to {}", path.display());
            }
            ConfigAction::Validate => {
                // Already loaded and validated in CliHandler::new()
                match &self.config_path {
                    Some(path) => println!("Configuration {} is valid", path.display()),
                    None => println!("Configuration is valid"),
                }
            }
        }
        Ok(())
    }
}

/// Print state changes and handshake replies until `shutdown` completes.
///
/// `shutdown` is polled as one future for the whole loop, so a signal
/// arriving while a branch is being handled is not lost.
async fn follow(
    engine: &SyncEngine,
    shutdown: impl Future<Output = ()>,
    greet: bool,
    json: bool,
) -> Result<()> {
    let greeter = greet.then(|| {
        let mut client = HandshakeClient::new();
        client.start();
        Arc::new(client)
    });
    let mut greeted = HashSet::new();

    let mut state = engine.state();
    let mut effects = engine.effects();
    let mut last = SyncState::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                if snapshot != last {
                    print_state(&snapshot, json)?;
                    if let Some(client) = &greeter {
                        greet_new_peers(client, &snapshot, &mut greeted);
                    }
                    last = snapshot;
                }
            }
            effect = effects.recv() => {
                match effect {
                    Ok(SyncSideEffect::HandShakeResponse(body)) => {
                        println!("Handshake response: {}", body);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("Missed {} side effects", n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    Ok(())
}

fn print_state(state: &SyncState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }

    println!(
        "registered={} in_progress={} scanning={} tab={} peers={}",
        state.registered,
        state.register_in_progress,
        state.is_scanning,
        state.selected_tab,
        state.scanned_services.len()
    );
    for service in state.sorted_services() {
        let addresses: Vec<String> = service.addresses.iter().map(|a| a.to_string()).collect();
        println!(
            "  {} - {}:{} [{}]",
            service.display_name(),
            service.host,
            service.port,
            addresses.join(", ")
        );
    }
    Ok(())
}

/// Handshake each peer the first time it shows up resolved
fn greet_new_peers(
    client: &Arc<HandshakeClient>,
    state: &SyncState,
    greeted: &mut HashSet<String>,
) {
    greeted.retain(|key| state.scanned_services.iter().any(|s| &s.key == key));

    for service in &state.scanned_services {
        if !greeted.insert(service.key.clone()) {
            continue;
        }
        let client = client.clone();
        let service = service.clone();
        tokio::spawn(async move {
            let response = client.head_shake(&service).await;
            println!("{} says: {}", service.display_name(), response);
        });
    }
}
