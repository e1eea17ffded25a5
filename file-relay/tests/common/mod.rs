//! Shared loopback cluster for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use file_relay::client::Client;
use file_relay::codec::Codec;
use file_relay::config::{NodeConfig, Role};
use file_relay::server;

pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// One running node and the handle that stops it.
pub struct Running {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl Running {
    pub async fn start(config: NodeConfig) -> Self {
        let (listener, node) = server::bind(&config).await.expect("bind node");
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, node, async {
            let _ = stopped.await;
        }));
        Self {
            addr,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Stop accepting and wait until the listening socket is closed.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.expect("server task panicked").expect("server failed");
        }
    }
}

/// Coordinator plus both backend stores, each rooted in one temp dir.
pub struct Cluster {
    pub tmp: TempDir,
    pub coordinator: Running,
    pub text: Running,
    pub pdf: Running,
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

impl Cluster {
    pub async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let text = Running::start(
            NodeConfig::store(Role::TextStore, loopback(), tmp.path().join("stext")).with_ack_timeout(ACK_TIMEOUT),
        )
        .await;
        let pdf = Running::start(
            NodeConfig::store(Role::PdfStore, loopback(), tmp.path().join("spdf")).with_ack_timeout(ACK_TIMEOUT),
        )
        .await;
        let coordinator = Running::start(
            NodeConfig::coordinator(loopback(), tmp.path().join("smain"), text.addr, pdf.addr)
                .with_ack_timeout(ACK_TIMEOUT)
                .with_connect_timeout(Duration::from_secs(1)),
        )
        .await;
        Self {
            tmp,
            coordinator,
            text,
            pdf,
        }
    }

    pub fn root(&self, store: &str) -> PathBuf {
        self.tmp.path().join(store)
    }

    pub async fn client(&self) -> Client<TcpStream> {
        Client::connect(self.coordinator.addr, "smain", ACK_TIMEOUT, Duration::from_secs(1))
            .await
            .expect("connect to coordinator")
    }

    /// A bare codec on the coordinator, for sending hand-written commands.
    pub async fn raw(&self) -> Codec<TcpStream> {
        let stream = TcpStream::connect(self.coordinator.addr).await.unwrap();
        Codec::new(stream, ACK_TIMEOUT)
    }
}
