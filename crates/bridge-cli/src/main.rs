// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `scenebridge`: drive the scene bridge from the command line.
//!
//! - `demo` syncs a small built-in scene to a renderer peer and asks for one
//!   frame back.
//! - `stub-peer` listens for clients and answers them from a headless mock
//!   renderer.
//! - `prefs` shows or saves the connection preferences.

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_config::{ConfigService, FsConfigStore, IdWidthPref, SessionPrefs, PREFS_KEY};
use bridge_session_client::ConnectOptions;
use bridge_session_proto::IdWidth;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod demo;
mod stub_peer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,

    #[command(subcommand)]
    cmd: Command,
}

/// Overrides applied on top of the saved prefs.
#[derive(Args, Debug, Clone, Default)]
struct ConnArgs {
    /// Peer host
    #[arg(long, global = true)]
    host: Option<String>,
    /// Peer port
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Speak 64-bit entity ids
    #[arg(long, global = true)]
    wide: bool,
    /// Receive bound in milliseconds
    #[arg(long, global = true)]
    receive_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the built-in demo scene and request a render
    Demo {
        /// Sync passes to run; the first cube moves between passes
        #[arg(long, default_value_t = 2)]
        passes: u32,
        /// Render width
        #[arg(long, default_value_t = 64)]
        width: u16,
        /// Render height
        #[arg(long, default_value_t = 64)]
        height: u16,
        /// How long to wait for the frame, in milliseconds
        #[arg(long, default_value_t = 5000)]
        render_timeout_ms: u64,
        /// Write the raw RGBA8 pixels here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Serve a headless mock renderer
    StubPeer,
    /// Show or save connection preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsAction {
    /// Print the effective prefs as JSON
    Show,
    /// Persist the effective prefs
    Save,
}

fn load_prefs(config: Option<&ConfigService<FsConfigStore>>) -> SessionPrefs {
    let Some(cfg) = config else {
        return SessionPrefs::default();
    };
    match cfg.load::<SessionPrefs>(PREFS_KEY) {
        Ok(prefs) => prefs.unwrap_or_default(),
        Err(err) => {
            warn!(?err, "ignoring unreadable session prefs");
            SessionPrefs::default()
        }
    }
}

fn apply_overrides(mut prefs: SessionPrefs, args: &ConnArgs) -> SessionPrefs {
    if let Some(host) = &args.host {
        prefs.host.clone_from(host);
    }
    if let Some(port) = args.port {
        prefs.port = port;
    }
    if args.wide {
        prefs.id_width = IdWidthPref::Wide;
    }
    if args.receive_timeout_ms.is_some() {
        prefs.receive_timeout_ms = args.receive_timeout_ms;
    }
    prefs
}

fn connect_options(prefs: &SessionPrefs) -> ConnectOptions {
    ConnectOptions {
        host: prefs.host.clone(),
        port: prefs.port,
        connect_timeout: Duration::from_millis(prefs.connect_timeout_ms),
        receive_timeout: prefs.receive_timeout_ms.map(Duration::from_millis),
        max_payload: prefs.max_payload_bytes,
        id_width: match prefs.id_width {
            IdWidthPref::Narrow => IdWidth::Narrow,
            IdWidthPref::Wide => IdWidth::Wide,
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    // Config (best-effort)
    let config: Option<ConfigService<FsConfigStore>> = FsConfigStore::new().map(ConfigService::new).ok();
    let prefs = apply_overrides(load_prefs(config.as_ref()), &cli.conn);
    prefs.validate().context("invalid session prefs")?;
    let opts = connect_options(&prefs);

    match cli.cmd {
        Command::Demo {
            passes,
            width,
            height,
            render_timeout_ms,
            out,
        } => {
            let settings = demo::DemoSettings {
                passes,
                width,
                height,
                render_timeout: Duration::from_millis(render_timeout_ms),
                out,
            };
            tokio::task::spawn_blocking(move || demo::run(&opts, &settings)).await??;
        }
        Command::StubPeer => {
            let addr = format!("{}:{}", opts.host, opts.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("bind {addr}"))?;
            info!(%addr, "stub peer listening");
            stub_peer::serve(listener, opts.id_width, opts.max_payload).await?;
        }
        Command::Prefs { action } => match action {
            PrefsAction::Show => {
                let json = serde_json::to_string_pretty(&prefs)?;
                writeln!(std::io::stdout().lock(), "{json}")?;
            }
            PrefsAction::Save => {
                let cfg = config.context("no config directory available")?;
                cfg.save(PREFS_KEY, &prefs)?;
                info!(path = %cfg.store().path_for(PREFS_KEY).display(), "session prefs saved");
            }
        },
    }

    Ok(())
}
