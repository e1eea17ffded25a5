//! Accept loop shared by the coordinator and both backend stores.
//!
//! ```text
//!   TcpListener ──accept──▶ spawn Session ──▶ JoinSet
//!        ▲                                      │
//!        └──────────── reap + log outcome ◀─────┘
//! ```
//!
//! Each connection is served by its own task, so one slow or broken peer
//! never blocks another.  A failed session is logged and forgotten; only a
//! shutdown signal stops the listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};

use crate::config::NodeConfig;
use crate::error::Error;
use crate::node::Node;
use crate::session::{Session, SessionSummary};

type SessionOutcome = (SocketAddr, Result<SessionSummary, Error>);

/// Pause after a failed `accept`, e.g. when the process is out of file
/// descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Prepare the storage root and bind the listening socket for `config`.
pub async fn bind(config: &NodeConfig) -> std::io::Result<(TcpListener, Arc<Node>)> {
    let node = Node::new(config);
    node.store().ensure_root().await?;
    let listener = TcpListener::bind(config.listen).await?;
    log::info!(
        "[server] {} listening on {} (root {})",
        config.role,
        listener.local_addr()?,
        node.store().root().display()
    );
    Ok((listener, Arc::new(node)))
}

/// Serve connections on `listener` until `shutdown` resolves.
///
/// Sessions still running at shutdown are aborted.
pub async fn serve<F>(listener: TcpListener, node: Arc<Node>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut sessions: JoinSet<SessionOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("[server] set_nodelay on {addr}: {e}");
                    }
                    let node = Arc::clone(&node);
                    let ack_timeout = node.ack_timeout();
                    sessions.spawn(async move {
                        let outcome = Session::new(stream, node, addr.to_string(), ack_timeout).run().await;
                        (addr, outcome)
                    });
                }
                Err(e) => back_off(e).await,
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => report(joined),
            _ = &mut shutdown => {
                log::info!("[server] shutting down with {} open session(s)", sessions.len());
                break;
            }
        }
    }

    sessions.shutdown().await;
    Ok(())
}

async fn back_off(e: std::io::Error) {
    log::warn!("[server] accept failed: {e}; retrying in {ACCEPT_BACKOFF:?}");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

fn report(joined: Result<SessionOutcome, JoinError>) {
    match joined {
        Ok((addr, Ok(summary))) => log::info!(
            "[server] session {addr} ended after {} command(s), {} failed",
            summary.commands,
            summary.failed
        ),
        Ok((addr, Err(e))) => log::warn!("[server] session {addr} aborted: {e}"),
        Err(e) if e.is_cancelled() => log::debug!("[server] session task cancelled"),
        Err(e) => log::error!("[server] session task panicked: {e}"),
    }
}
