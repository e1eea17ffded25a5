//! Entry point for `file-relay`.
//!
//! Parses CLI arguments and dispatches into **coordinator**, **store** or
//! **client** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, signal handling, argument
//! parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::BufReader;

use file_relay::client::Client;
use file_relay::config::{self, ClientConfig, NodeConfig, Role};
use file_relay::{repl, server};

/// Distributed file store: a coordinator plus text and pdf backends.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Seconds to wait for each acknowledgment.
    #[arg(long, global = true, env = "FILE_RELAY_ACK_TIMEOUT", default_value_t = 10)]
    ack_timeout: u64,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the client-facing coordinator (stores .c, relays .txt and .pdf).
    Coordinator {
        /// Local address to bind.
        #[arg(short, long, env = "FILE_RELAY_LISTEN", default_value = "127.0.0.1:41581")]
        listen: SocketAddr,
        /// Storage root (defaults to ~/smain).
        #[arg(short, long, env = "FILE_RELAY_ROOT")]
        root: Option<PathBuf>,
        /// Address of the text store.
        #[arg(long, env = "FILE_RELAY_TEXT_STORE", default_value = "127.0.0.1:51238")]
        text_store: SocketAddr,
        /// Address of the pdf store.
        #[arg(long, env = "FILE_RELAY_PDF_STORE", default_value = "127.0.0.1:39462")]
        pdf_store: SocketAddr,
        /// Seconds allowed to connect to a backend store.
        #[arg(long, env = "FILE_RELAY_CONNECT_TIMEOUT", default_value_t = 5)]
        connect_timeout: u64,
    },
    /// Run a backend store for one file class.
    Store {
        #[arg(short, long, value_enum)]
        class: StoreClass,
        /// Local address to bind (defaults to the class's well-known port).
        #[arg(short, long, env = "FILE_RELAY_LISTEN")]
        listen: Option<SocketAddr>,
        /// Storage root (defaults to ~/stext or ~/spdf).
        #[arg(short, long, env = "FILE_RELAY_ROOT")]
        root: Option<PathBuf>,
    },
    /// Interactive client connected to the coordinator.
    Client {
        /// Coordinator address.
        #[arg(short, long, env = "FILE_RELAY_SERVER", default_value = "127.0.0.1:41581")]
        server: SocketAddr,
        /// Where downloads and archives are saved.
        #[arg(short, long, env = "FILE_RELAY_DOWNLOAD_DIR", default_value = ".")]
        download_dir: PathBuf,
        /// Seconds allowed to connect to the coordinator.
        #[arg(long, env = "FILE_RELAY_CONNECT_TIMEOUT", default_value_t = 5)]
        connect_timeout: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreClass {
    Text,
    Pdf,
}

impl From<StoreClass> for Role {
    fn from(class: StoreClass) -> Self {
        match class {
            StoreClass::Text => Role::TextStore,
            StoreClass::Pdf => Role::PdfStore,
        }
    }
}

fn storage_root(role: Role, root: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    root.or_else(|| config::default_root(role))
        .ok_or_else(|| anyhow!("no home directory; pass --root for the {role}"))
}

async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    let (listener, node) = server::bind(&config)
        .await
        .with_context(|| format!("starting {} on {}", config.role, config.listen))?;
    server::serve(listener, node, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[server] cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let ack_timeout = Duration::from_secs(cli.ack_timeout);

    match cli.mode {
        Mode::Coordinator {
            listen,
            root,
            text_store,
            pdf_store,
            connect_timeout,
        } => {
            let root = storage_root(Role::Coordinator, root)?;
            let config = NodeConfig::coordinator(listen, root, text_store, pdf_store)
                .with_ack_timeout(ack_timeout)
                .with_connect_timeout(Duration::from_secs(connect_timeout));
            run_node(config).await
        }
        Mode::Store { class, listen, root } => {
            let role = Role::from(class);
            let root = storage_root(role, root)?;
            let listen = listen.unwrap_or_else(|| role.default_listen());
            run_node(NodeConfig::store(role, listen, root).with_ack_timeout(ack_timeout)).await
        }
        Mode::Client {
            server,
            download_dir,
            connect_timeout,
        } => {
            let config = ClientConfig::new(server, download_dir)
                .with_ack_timeout(ack_timeout)
                .with_connect_timeout(Duration::from_secs(connect_timeout));
            let mut client = Client::connect(
                config.server,
                Role::Coordinator.store_name(),
                config.ack_timeout,
                config.connect_timeout,
            )
            .await
            .with_context(|| format!("connecting to {}", config.server))?;
            println!("Connected to {}", config.server);

            let stdin = BufReader::new(tokio::io::stdin());
            repl::run(&mut client, &config.download_dir, stdin, tokio::io::stdout()).await?;
            client.shutdown().await?;
            Ok(())
        }
    }
}
