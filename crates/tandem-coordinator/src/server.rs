//! Websocket coordinator server
//!
//! Accepts sockets, validates each one's hello within the handshake timeout,
//! registers it with the [`SessionRegistry`] and hands the resulting
//! [`SessionReady`] to the session policy on its own task.

use crate::handshake::parse_handshake;
use crate::registry::{SessionReady, SessionRegistry};
use crate::{HandshakeError, RegistryResult, SessionPolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{MpcEngine, ShareStorage, TandemConfig};
use tandem_transport::{accept_socket, CLOSE_PROTOCOL_ERROR};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Running coordinator
pub struct CoordinatorServer<E: MpcEngine> {
    local_addr: SocketAddr,
    registry: Arc<SessionRegistry<E>>,
    shutdown: watch::Sender<bool>,
    accept_loop: JoinHandle<()>,
}

impl<E: MpcEngine> CoordinatorServer<E> {
    /// Bind `config.server.bind_addr` and start accepting sockets
    pub async fn bind(
        config: &TandemConfig,
        storage: Arc<dyn ShareStorage>,
        engine: Arc<E>,
        policy: Arc<dyn SessionPolicy<E>>,
    ) -> RegistryResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.server.socket_addr()?).await?;
        let local_addr = listener.local_addr()?;

        let registry = SessionRegistry::new(
            engine,
            storage,
            config.driver.clone(),
            config.backup.default_options(),
        );
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_loop = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&registry),
            policy,
            config.server.handshake_timeout(),
            shutdown_rx,
        ));

        tracing::info!(%local_addr, "coordinator listening");
        Ok(Self {
            local_addr,
            registry,
            shutdown,
            accept_loop,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Session registry
    pub fn registry(&self) -> &Arc<SessionRegistry<E>> {
        &self.registry
    }

    /// Stop accepting and close every session
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.accept_loop.await {
            tracing::warn!(error = %e, "accept loop ended abnormally");
        }
        self.registry.close_all();
        tracing::info!(addr = %self.local_addr, "coordinator stopped");
    }
}

async fn accept_loop<E: MpcEngine>(
    listener: TcpListener,
    registry: Arc<SessionRegistry<E>>,
    policy: Arc<dyn SessionPolicy<E>>,
    handshake_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let registry = Arc::clone(&registry);
                    let policy = Arc::clone(&policy);
                    tokio::spawn(async move {
                        match handle_connection(stream, &registry, handshake_timeout).await {
                            Ok(Some(ready)) => policy.on_session_ready(ready).await,
                            Ok(None) => {}
                            Err(e) => tracing::warn!(%peer, error = %e, "connection failed"),
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
        }
    }
}

async fn handle_connection<E: MpcEngine>(
    stream: TcpStream,
    registry: &Arc<SessionRegistry<E>>,
    handshake_timeout: Duration,
) -> RegistryResult<Option<SessionReady<E>>> {
    let (link, mut inbound) = accept_socket(stream).await?;

    let handshake = match tokio::time::timeout(handshake_timeout, inbound.next_frame()).await {
        Ok(Some(frame)) => parse_handshake(&frame),
        Ok(None) => {
            tracing::debug!("socket closed before handshake");
            return Ok(None);
        }
        Err(_) => Err(HandshakeError::Timeout),
    };

    match handshake {
        Ok(handshake) => registry.register(handshake, link, inbound).map(Some),
        Err(e) => {
            tracing::warn!(error = %e, "rejected handshake");
            link.close(CLOSE_PROTOCOL_ERROR, &e.close_reason());
            Ok(None)
        }
    }
}
