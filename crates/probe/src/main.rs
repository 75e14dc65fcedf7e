//! Diagnostic client for Ember nodes.
//!
//! Loads a client config (or builds a one-node config from flags) and runs
//! one of:
//!
//! - `check`   — validate the configuration and print every issue
//! - `search`  — resolve a query through the least-loaded node
//! - `decode`  — rebuild tracks from their base64 ids
//! - `watch`   — connect every node and log state changes, events and load
//!
//! Usage:
//!   ember-probe --config ember.toml watch
//!   ember-probe --host 127.0.0.1 --password youshallnotpass search "never gonna" --source yt
//!
//! `RUST_LOG` controls verbosity (default `info`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ember_domain::config::{ClientConfig, ConfigSeverity, NodeConfig};
use ember_node::{Node, NodePool, SearchOptions, SearchResult, Source, Track};
use tracing_subscriber::EnvFilter;

/// Ember node probe.
#[derive(Debug, Parser)]
#[command(name = "ember-probe", version, about)]
struct Cli {
    /// TOML client config. When absent, a single node is built from flags.
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 2333)]
    port: u16,
    #[arg(long, env = "EMBER_PASSWORD")]
    password: Option<String>,
    #[arg(long, env = "EMBER_USER_ID", default_value = "0")]
    user_id: String,
    #[arg(long)]
    secure: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse the configuration and report any issues.
    Check,
    /// Search for tracks.
    Search {
        query: String,
        /// youtube, youtube_music, soundcloud, local (or yt, ytm, sc).
        #[arg(long)]
        source: Option<Source>,
        #[arg(long)]
        limit: Option<usize>,
        /// Keep the source prefix even for URLs.
        #[arg(long)]
        strict: bool,
    },
    /// Rebuild tracks from base64 ids.
    Decode {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Decode one by one, skipping ids the node rejects.
        #[arg(long)]
        atomic: bool,
    },
    /// Connect and log activity until interrupted.
    Watch {
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // ── Config ─────────────────────────────────────────────────────
    let config = load_config(&cli)?;
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!("{issue}"),
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }

    if matches!(cli.command, Command::Check) {
        println!("{} node(s), {} issue(s)", config.nodes.len(), issues.len());
        for issue in &issues {
            println!("{issue}");
        }
        return Ok(());
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        bail!("configuration has errors");
    }

    let pool = NodePool::from_config(&config)?;

    match cli.command {
        Command::Check => {}
        Command::Search {
            query,
            source,
            limit,
            strict,
        } => {
            let node = pool.get_node(None, None)?;
            let opts = SearchOptions {
                source,
                strict,
                limit,
                ..Default::default()
            };
            match node.search_tracks(&query, &opts, ()).await? {
                SearchResult::Tracks(tracks) => {
                    for track in &tracks {
                        print_track(track);
                    }
                }
                SearchResult::Playlist(playlist) => {
                    println!(
                        "playlist {:?} ({} tracks, selected {:?})",
                        playlist.name,
                        playlist.len(),
                        playlist.selected_index()
                    );
                    for track in playlist.tracks() {
                        print_track(track);
                    }
                }
            }
        }
        Command::Decode { ids, atomic } => {
            let node = pool.get_node(None, None)?;
            for track in node.fetch_tracks(&ids, atomic, ()).await? {
                print_track(&track);
            }
        }
        Command::Watch { seconds } => watch(&pool, seconds).await?,
    }

    pool.destroy_all().await;
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    if let Some(ref path) = cli.config {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: ClientConfig = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::info!(path = %path.display(), nodes = config.nodes.len(), "configuration loaded");
        return Ok(config);
    }

    Ok(ClientConfig {
        user_id: cli.user_id.clone(),
        client_name: None,
        nodes: vec![NodeConfig {
            host: cli.host.clone(),
            port: cli.port,
            password: cli.password.clone(),
            secure: cli.secure,
            ..Default::default()
        }],
    })
}

fn print_track<M>(track: &Track<M>) {
    let secs = track.duration.as_secs();
    println!(
        "{:>3}:{:02}  {}  {}  [{}]",
        secs / 60,
        secs % 60,
        track.title,
        track.author.as_deref().unwrap_or("unknown"),
        track.id
    );
}

async fn watch(pool: &NodePool, seconds: Option<u64>) -> anyhow::Result<()> {
    let failures = pool.connect_all().await;
    for (node_id, error) in &failures {
        tracing::error!(node_id = %node_id, error = %error, "connect failed");
    }
    if failures.len() == pool.len() {
        bail!("no node could be reached");
    }

    for node in pool.nodes() {
        spawn_observers(node);
    }

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
        _ = deadline => tracing::info!("watch period elapsed"),
    }
    Ok(())
}

fn spawn_observers(node: Node) {
    let mut states = node.watch_state();
    let id = node.identifier().to_owned();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(node_id = %id, %state, "state changed");
        }
    });

    let mut events = node.subscribe();
    let id = node.identifier().to_owned();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event.kind).unwrap_or_default();
                    tracing::info!(node_id = %id, guild_id = event.guild_id, event = %json, "event");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(node_id = %id, skipped = n, "event observer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            if node.session().is_destroyed() {
                break;
            }
            if let Some(stats) = node.stats() {
                tracing::info!(
                    node_id = %node.identifier(),
                    players = stats.players,
                    playing = stats.playing_players,
                    penalty = node.penalty(),
                    "load"
                );
            }
        }
    });
}
