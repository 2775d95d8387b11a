//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Accepts new TCP connections, refusing those beyond `max_clients`.
//! - Spawns a per-connection task (see `client`) that upgrades the
//!   connection to a WebSocket and runs it against the shared [`Hub`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::client::{self, ClientSettings};
use crate::config::Config;
use crate::hub::Hub;

/// Counts a live connection until dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bind the configured address and serve until the listener fails.
pub async fn run(config: &Config, hub: Arc<Hub>) -> anyhow::Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, max_clients = config.max_clients, "listening");

    serve(listener, hub, config).await
}

/// Accept connections on an already-bound listener.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>, config: &Config) -> anyhow::Result<()> {
    let settings = ClientSettings::from(config);
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;

        if active.load(Ordering::Acquire) >= config.max_clients {
            warn!(peer = %peer, max_clients = config.max_clients, "rejecting connection: server full");
            // Just drop the stream; client will see the connection closed.
            continue;
        }
        active.fetch_add(1, Ordering::AcqRel);
        let slot = ConnectionSlot(active.clone());

        let hub = hub.clone();
        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = client::run_client(hub, stream, peer, settings).await {
                debug!(peer = %peer, error = %e, "connection ended with error");
            }
        });
    }
}
