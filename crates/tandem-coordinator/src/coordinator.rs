//! Per-session coordinator
//!
//! Binds a transport and share storage to the driver so session policies can
//! run DKG or signing without threading those through every call.

use crate::driver::{self, DkgOptions, DkgOutcome, SignOptions};
use crate::DriverResult;
use std::fmt;
use std::sync::Arc;
use tandem_core::{
    BackupOptions, DriverConfig, EngineResult, MpcEngine, SessionContext, ShareStorage,
};
use tandem_transport::Transport;

/// Transport, storage and driver limits for one session
#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn ShareStorage>,
    driver: DriverConfig,
    backup_defaults: BackupOptions,
}

impl Coordinator {
    /// Coordinator with default driver limits
    pub fn new(transport: Arc<dyn Transport>, storage: Arc<dyn ShareStorage>) -> Self {
        Self {
            transport,
            storage,
            driver: DriverConfig::default(),
            backup_defaults: BackupOptions::default(),
        }
    }

    /// Override the driver limits
    pub fn with_driver_config(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Fallback options for device backups
    pub fn with_backup_defaults(mut self, defaults: BackupOptions) -> Self {
        self.backup_defaults = defaults;
        self
    }

    /// Session transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Shared share storage
    pub fn storage(&self) -> &Arc<dyn ShareStorage> {
        &self.storage
    }

    /// Driver limits in effect
    pub fn driver_config(&self) -> &DriverConfig {
        &self.driver
    }

    /// Open a fresh context on `engine`
    pub fn init_context<E: MpcEngine>(&self, engine: Arc<E>) -> EngineResult<SessionContext<E>> {
        SessionContext::open(engine)
    }

    /// Run DKG on this session; see [`driver::run_dkg`]
    pub async fn run_dkg<E: MpcEngine>(
        &self,
        ctx: &SessionContext<E>,
        options: DkgOptions,
    ) -> DriverResult<DkgOutcome<E::Keypair>> {
        driver::run_dkg(
            ctx,
            self.transport.as_ref(),
            self.storage.as_ref(),
            &self.driver,
            &self.backup_defaults,
            options,
        )
        .await
    }

    /// Run signing on this session; see [`driver::run_sign`]
    pub async fn run_sign<E: MpcEngine>(
        &self,
        ctx: &SessionContext<E>,
        device: Option<&E::Keypair>,
        server: Option<&E::Keypair>,
        options: SignOptions,
    ) -> DriverResult<Option<Vec<u8>>> {
        driver::run_sign(
            ctx,
            self.transport.as_ref(),
            &self.driver,
            device,
            server,
            options,
        )
        .await
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}
