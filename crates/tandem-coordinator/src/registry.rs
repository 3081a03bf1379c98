//! Session registry
//!
//! Owns every live session keyed by session id. A session is created by the
//! first valid handshake for its id, updated by later ones (socket rebinding,
//! last-write-wins intent and token) and removed when a bound socket closes
//! or a policy closes it. Removal force-closes the counterpart socket and
//! releases the session context.

use crate::handshake::{Handshake, SessionIntent};
use crate::{Coordinator, RegistryResult};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tandem_core::{
    BackupOptions, DriverConfig, MpcEngine, Participant, SessionContext, SessionId, ShareStorage,
};
use tandem_transport::{SocketInbound, SocketLink, SocketRelayTransport, CLOSE_NORMAL};
use uuid::Uuid;

struct SessionState<E: MpcEngine> {
    transport: SocketRelayTransport,
    coordinator: Arc<Coordinator>,
    context: Arc<SessionContext<E>>,
    bound: [Option<Uuid>; 2],
    intent: SessionIntent,
    token: Option<String>,
}

/// Notification handed to the session policy on every accepted handshake
pub struct SessionReady<E: MpcEngine> {
    /// Session id
    pub session_id: SessionId,
    /// Role of the socket whose handshake triggered this notification
    pub role: Participant,
    /// Latest authorization token
    pub token: Option<String>,
    /// Latest intent
    pub intent: SessionIntent,
    /// Coordinator bound to the session transport
    pub coordinator: Arc<Coordinator>,
    /// Session context
    pub context: Arc<SessionContext<E>>,
    /// Session transport
    pub transport: SocketRelayTransport,
    closer: SessionCloser<E>,
}

impl<E: MpcEngine> SessionReady<E> {
    /// Close the session, its sockets and its context
    pub fn close(&self) {
        self.closer.close();
    }

    /// Handle that closes this session later
    pub fn closer(&self) -> SessionCloser<E> {
        self.closer.clone()
    }
}

impl<E: MpcEngine> fmt::Debug for SessionReady<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionReady")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .field("intent", &self.intent)
            .finish_non_exhaustive()
    }
}

/// Closes one session on its registry
pub struct SessionCloser<E: MpcEngine> {
    registry: Arc<SessionRegistry<E>>,
    session_id: SessionId,
}

impl<E: MpcEngine> SessionCloser<E> {
    /// Close the session; a no-op once it is gone
    pub fn close(&self) {
        self.registry.close(&self.session_id);
    }
}

impl<E: MpcEngine> Clone for SessionCloser<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            session_id: self.session_id.clone(),
        }
    }
}

/// Process-wide session map with explicit lifecycle
pub struct SessionRegistry<E: MpcEngine> {
    engine: Arc<E>,
    storage: Arc<dyn ShareStorage>,
    driver: DriverConfig,
    backup_defaults: BackupOptions,
    sessions: Mutex<HashMap<SessionId, SessionState<E>>>,
}

impl<E: MpcEngine> SessionRegistry<E> {
    /// Empty registry creating contexts on `engine`
    pub fn new(
        engine: Arc<E>,
        storage: Arc<dyn ShareStorage>,
        driver: DriverConfig,
        backup_defaults: BackupOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            storage,
            driver,
            backup_defaults,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Bind a socket that sent a valid handshake.
    ///
    /// Creates the session on first sight, rebinds `handshake.role` otherwise,
    /// and arranges for the session to close when this socket closes while
    /// still bound.
    pub fn register(
        self: &Arc<Self>,
        handshake: Handshake,
        link: SocketLink,
        inbound: SocketInbound,
    ) -> RegistryResult<SessionReady<E>> {
        let Handshake {
            session_id,
            role,
            token,
            intent,
        } = handshake;
        let link_id = link.id();

        let ready = {
            let mut sessions = self.sessions.lock();
            let state = match sessions.entry(session_id.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    tracing::info!(session = %session_id, "session created");
                    entry.insert(self.new_session()?)
                }
            };

            state.transport.attach(role, link.clone(), inbound);
            state.bound[role.index()] = Some(link_id);
            state.intent = intent;
            state.token = token;

            SessionReady {
                session_id: session_id.clone(),
                role,
                token: state.token.clone(),
                intent: state.intent.clone(),
                coordinator: Arc::clone(&state.coordinator),
                context: Arc::clone(&state.context),
                transport: state.transport.clone(),
                closer: SessionCloser {
                    registry: Arc::clone(self),
                    session_id: session_id.clone(),
                },
            }
        };

        tracing::info!(
            session = %session_id,
            %role,
            intent = %ready.intent.kind(),
            "participant bound"
        );

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            link.closed().await;
            registry.close_if_bound(&session_id, role, link_id);
        });

        Ok(ready)
    }

    fn new_session(&self) -> RegistryResult<SessionState<E>> {
        let transport = SocketRelayTransport::new();
        let coordinator = Coordinator::new(Arc::new(transport.clone()), Arc::clone(&self.storage))
            .with_driver_config(self.driver.clone())
            .with_backup_defaults(self.backup_defaults.clone());
        let context = SessionContext::open(Arc::clone(&self.engine))?;
        Ok(SessionState {
            transport,
            coordinator: Arc::new(coordinator),
            context: Arc::new(context),
            bound: [None, None],
            intent: SessionIntent::default(),
            token: None,
        })
    }

    /// Close `session_id` only if `link_id` is still `role`'s socket
    fn close_if_bound(&self, session_id: &SessionId, role: Participant, link_id: Uuid) {
        let still_bound = self
            .sessions
            .lock()
            .get(session_id)
            .is_some_and(|state| state.bound[role.index()] == Some(link_id));
        if still_bound {
            tracing::debug!(session = %session_id, %role, "bound socket closed");
            self.close(session_id);
        }
    }

    /// Remove a session, closing its sockets and releasing its context.
    ///
    /// Returns `false` when the session was already gone.
    pub fn close(&self, session_id: &SessionId) -> bool {
        let Some(state) = self.sessions.lock().remove(session_id) else {
            return false;
        };
        state.transport.close_all(CLOSE_NORMAL, "session closed");
        state.context.release();
        tracing::info!(session = %session_id, "session closed");
        true
    }

    /// Close every session
    pub fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.lock().keys().cloned().collect();
        for id in ids {
            self.close(&id);
        }
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether `session_id` is live
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().contains_key(session_id)
    }
}

impl<E: MpcEngine> fmt::Debug for SessionRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}
