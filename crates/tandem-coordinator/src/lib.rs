//! Tandem Coordinator
//!
//! Server side of the two-party wallet: the round-trip driver that pumps the
//! MPC primitive to completion, the session registry that turns websocket
//! handshakes into sessions, and the policy seam that decides what each
//! session runs.
//!
//! # Flow
//!
//! - [`CoordinatorServer`] accepts sockets and validates the hello frame
//! - [`SessionRegistry`] binds the socket to its role and creates the
//!   per-session [`Coordinator`] and MPC context
//! - a [`SessionPolicy`] receives [`SessionReady`] and drives DKG or signing
//!   through [`driver`]
//!
//! The driver is equally usable without the server, e.g. with both roles in
//! one process over an in-memory transport.

pub mod backup;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod handshake;
pub mod policy;
pub mod registry;
pub mod server;

pub use backup::{accept_backup_fragment, coordinator_fragment_key, FragmentAcceptance};
pub use coordinator::Coordinator;
pub use driver::{run_dkg, run_sign, DkgOptions, DkgOutcome, DriveMode, SignOptions};
pub use error::{
    DriverError, DriverResult, HandshakeError, PolicyError, PolicyResult, RegistryError,
    RegistryResult,
};
pub use handshake::{parse_handshake, Handshake, SessionIntent};
pub use policy::{SessionPolicy, StandardSessionPolicy, DONE_SIGNAL};
pub use registry::{SessionCloser, SessionReady, SessionRegistry};
pub use server::CoordinatorServer;
