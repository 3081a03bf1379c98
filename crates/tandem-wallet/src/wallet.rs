//! Device wallet flows
//!
//! [`DeviceWallet`] runs the device half of every protocol against a remote
//! coordinator and keeps the device share, the current-key pointer and the
//! local backup in share storage.

use crate::connection::{
    connect_to_coordinator, random_session_id, ConnectOptions, CoordinatorConnection,
};
use crate::{WalletError, WalletResult};
use std::fmt;
use std::sync::Arc;
use tandem_coordinator::{Coordinator, DkgOptions, DriveMode, SignOptions};
use tandem_core::config::DEFAULT_METADATA_KEY;
use tandem_core::{
    codec, BackupOptions, DeviceBackupArtifacts, DriverConfig, IntentKind, MpcEngine,
    SessionContext, ShareRecord, ShareStorage, SignatureFormat, TandemConfig,
};
use tandem_recovery::{
    persist_device_backup_locally, upload_backup_fragment, upload_third_party_fragment,
    CoordinatorApi, FragmentHost, HttpCoordinatorApi, HttpFragmentHost, RecoveredKey,
    RecoveryOrchestrator, UploadOptions, UploadOutcome,
};

/// Wallet-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletOptions {
    /// Coordinator websocket URL
    pub server_url: String,
    /// Default authorization token
    pub token: Option<String>,
    /// Storage key of the current-key pointer
    pub metadata_key: String,
    /// Driver limits for the device role
    pub driver: DriverConfig,
    /// Backup defaults applied when a call does not choose
    pub backup: BackupOptions,
    /// Coordinator fragment upload
    pub upload: UploadOptions,
    /// Fragment index pushed to the third-party host
    pub third_party_share_index: usize,
}

impl WalletOptions {
    /// Defaults against the coordinator at `server_url`
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: None,
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
            driver: DriverConfig::default(),
            backup: BackupOptions::default(),
            upload: UploadOptions::default(),
            third_party_share_index: tandem_recovery::DEFAULT_THIRD_PARTY_SHARE_INDEX,
        }
    }

    /// Settings for `server_url` taken from `config`
    pub fn from_config(server_url: impl Into<String>, config: &TandemConfig) -> Self {
        Self {
            metadata_key: config.recovery.metadata_key.clone(),
            driver: config.driver.clone(),
            backup: config.backup.default_options(),
            upload: UploadOptions::from_config(&config.backup),
            third_party_share_index: config.backup.third_party_share_index,
            ..Self::new(server_url)
        }
    }
}

/// Per-call inputs of [`DeviceWallet::create_key`]
#[derive(Debug, Clone, Default)]
pub struct CreateKeyOptions {
    /// Requested key id; the exported share's hex is used when absent
    pub key_id: Option<Vec<u8>>,
    /// Session id bytes; random when absent
    pub session_id: Option<Vec<u8>>,
    /// Transcript binding sent to the coordinator; the session id hex when absent
    pub session_id_hint: Option<String>,
    /// Token overriding the wallet default
    pub token: Option<String>,
    /// Backup preferences overriding the wallet defaults
    pub backup: Option<BackupOptions>,
}

/// Result of a successful key creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedKey {
    /// Hex key id the device share is stored under
    pub key_id: String,
    /// Session the key was generated in
    pub session_id: String,
    /// Backup produced alongside the key
    pub backup: Option<DeviceBackupArtifacts>,
    /// Whether the coordinator acknowledged its fragment
    pub coordinator_fragment_stored: bool,
}

/// Per-call inputs of [`DeviceWallet::sign_bytes`]
#[derive(Debug, Clone, Default)]
pub struct SignBytesOptions {
    /// Key to sign with; the current key when absent
    pub key_id: Option<Vec<u8>>,
    /// Bytes to sign
    pub message: Vec<u8>,
    /// Additional authenticated data
    pub extra_aad: Option<Vec<u8>>,
    /// Signature encoding; compact low-S when absent
    pub format: Option<SignatureFormat>,
    /// Token overriding the wallet default
    pub token: Option<String>,
}

/// A signature produced with the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSignature {
    /// Signature bytes
    pub signature: Vec<u8>,
    /// Encoding requested, `None` for compact
    pub format: Option<SignatureFormat>,
}

/// Device side of a two-party wallet
pub struct DeviceWallet<E: MpcEngine> {
    engine: Arc<E>,
    storage: Arc<dyn ShareStorage>,
    options: WalletOptions,
    coordinator_api: Option<Arc<dyn CoordinatorApi>>,
    fragment_host: Option<Arc<dyn FragmentHost>>,
}

impl<E: MpcEngine> DeviceWallet<E> {
    /// Wallet with no HTTP collaborators
    pub fn new(engine: Arc<E>, storage: Arc<dyn ShareStorage>, options: WalletOptions) -> Self {
        Self {
            engine,
            storage,
            options,
            coordinator_api: None,
            fragment_host: None,
        }
    }

    /// Wallet with HTTP collaborators built from `config.recovery`
    pub fn from_config(
        engine: Arc<E>,
        storage: Arc<dyn ShareStorage>,
        server_url: impl Into<String>,
        config: &TandemConfig,
    ) -> WalletResult<Self> {
        let mut wallet = Self::new(engine, storage, WalletOptions::from_config(server_url, config));
        if let Some(url) = &config.recovery.api_base_url {
            wallet.coordinator_api = Some(Arc::new(HttpCoordinatorApi::new(url)?));
        }
        if let Some(url) = &config.recovery.fragment_host_url {
            let host = HttpFragmentHost::new(url, config.recovery.fragment_host_token.clone())?;
            wallet.fragment_host = Some(Arc::new(host));
        }
        Ok(wallet)
    }

    /// Use `api` for existence checks and recovery
    pub fn with_coordinator_api(mut self, api: Arc<dyn CoordinatorApi>) -> Self {
        self.coordinator_api = Some(api);
        self
    }

    /// Use `host` for third-party fragments
    pub fn with_fragment_host(mut self, host: Arc<dyn FragmentHost>) -> Self {
        self.fragment_host = Some(host);
        self
    }

    /// Settings in effect
    pub fn options(&self) -> &WalletOptions {
        &self.options
    }

    /// Key id recorded as current, if any
    pub async fn current_key_id(&self) -> WalletResult<Option<String>> {
        let record = self.storage.load(&self.options.metadata_key).await?;
        Ok(record.map(|r| String::from_utf8_lossy(&r.blob).into_owned()))
    }

    /// Generate a new key with the coordinator.
    ///
    /// The device share and current-key pointer are persisted before any
    /// backup distribution; fragment uploads that fail are logged and do not
    /// fail the call.
    pub async fn create_key(&self, options: CreateKeyOptions) -> WalletResult<CreatedKey> {
        let token = options.token.clone().or_else(|| self.options.token.clone());
        let session_hex = match &options.session_id {
            Some(bytes) => codec::to_hex(bytes),
            None => random_session_id(),
        };
        let session_bytes = codec::from_hex(&session_hex)?;
        let requested_key = options.key_id.as_deref().map(codec::to_hex);

        if let Some(key_id) = &requested_key {
            self.ensure_not_registered(key_id, token.as_deref()).await?;
        }

        let connection = connect_to_coordinator(ConnectOptions {
            intent: IntentKind::Dkg,
            token,
            key_id: requested_key,
            session_id: Some(session_hex.clone()),
            session_id_hint: Some(options.session_id_hint.clone().unwrap_or(session_hex)),
            ..ConnectOptions::new(self.options.server_url.as_str())
        })
        .await?;

        let result = self.run_device_dkg(&connection, session_bytes, options).await;
        connection.close();
        result
    }

    async fn run_device_dkg(
        &self,
        connection: &CoordinatorConnection,
        session_bytes: Vec<u8>,
        options: CreateKeyOptions,
    ) -> WalletResult<CreatedKey> {
        let coordinator = Coordinator::new(connection.transport.clone(), Arc::clone(&self.storage))
            .with_driver_config(self.options.driver.clone())
            .with_backup_defaults(self.options.backup.clone());
        let ctx = coordinator.init_context(Arc::clone(&self.engine))?;
        let outcome = coordinator
            .run_dkg(
                &ctx,
                DkgOptions {
                    key_id: options.key_id,
                    session_id: Some(session_bytes),
                    mode: DriveMode::DeviceOnly,
                    backup: options.backup,
                },
            )
            .await;
        ctx.release();
        let outcome = outcome?;
        self.persist_key_identifier(&outcome.key_id).await;

        let coordinator_fragment_stored = match &outcome.backup {
            Some(backup) => self.distribute_backup(connection, &outcome.key_id, backup).await,
            None => {
                tracing::warn!(key_id = %outcome.key_id, "no backup artifacts produced");
                false
            }
        };

        Ok(CreatedKey {
            key_id: outcome.key_id,
            session_id: connection.session_id.clone(),
            backup: outcome.backup,
            coordinator_fragment_stored,
        })
    }

    /// Sign `options.message` with the coordinator
    pub async fn sign_bytes(&self, options: SignBytesOptions) -> WalletResult<WalletSignature> {
        let key_id = match &options.key_id {
            Some(bytes) => codec::to_hex(bytes),
            None => self.current_key_id().await?.ok_or(WalletError::NoKey)?,
        };
        let share = self
            .storage
            .load(&key_id)
            .await?
            .ok_or_else(|| WalletError::MissingShare(key_id.clone()))?;
        tracing::debug!(key_id = %key_id, bytes = share.blob.len(), "loaded device share");

        let connection = connect_to_coordinator(ConnectOptions {
            intent: IntentKind::Sign,
            token: options.token.clone().or_else(|| self.options.token.clone()),
            key_id: Some(key_id.clone()),
            message: Some(options.message.clone()),
            ..ConnectOptions::new(self.options.server_url.as_str())
        })
        .await?;

        let result = self.run_device_sign(&connection, &key_id, &share.blob, options).await;
        connection.close();
        result
    }

    async fn run_device_sign(
        &self,
        connection: &CoordinatorConnection,
        key_id: &str,
        share: &[u8],
        options: SignBytesOptions,
    ) -> WalletResult<WalletSignature> {
        let ctx = SessionContext::open(Arc::clone(&self.engine))?;
        let signed = self.sign_with_context(&ctx, connection, share, &options).await;
        ctx.release();
        let signature = signed?.ok_or(WalletError::NoSignature)?;
        tracing::info!(key_id, "signature produced");
        Ok(WalletSignature {
            signature,
            format: options.format,
        })
    }

    async fn sign_with_context(
        &self,
        ctx: &SessionContext<E>,
        connection: &CoordinatorConnection,
        share: &[u8],
        options: &SignBytesOptions,
    ) -> WalletResult<Option<Vec<u8>>> {
        let keypair = self.engine.keypair_import(ctx.raw(), share)?;
        let coordinator = Coordinator::new(connection.transport.clone(), Arc::clone(&self.storage))
            .with_driver_config(self.options.driver.clone());
        let signature = coordinator
            .run_sign(
                ctx,
                Some(&keypair),
                None,
                SignOptions {
                    message: options.message.clone(),
                    session_id: None,
                    extra_aad: options.extra_aad.clone(),
                    format: options.format,
                    mode: DriveMode::DeviceOnly,
                },
            )
            .await?;
        Ok(signature)
    }

    /// Rebuild the device share for `key_id` from backup fragments
    pub async fn recover_key(&self, key_id: &[u8], token: Option<&str>) -> WalletResult<RecoveredKey> {
        let token = token.or(self.options.token.as_deref());
        let mut orchestrator = RecoveryOrchestrator::new(Arc::clone(&self.engine), Arc::clone(&self.storage))
            .with_metadata_key(self.options.metadata_key.as_str());
        if let Some(api) = &self.coordinator_api {
            orchestrator = orchestrator.with_coordinator_api(Arc::clone(api));
        }
        if let Some(host) = &self.fragment_host {
            orchestrator = orchestrator.with_fragment_host(Arc::clone(host));
        }
        Ok(orchestrator.recover(&codec::to_hex(key_id), token).await?)
    }

    async fn ensure_not_registered(&self, key_id: &str, token: Option<&str>) -> WalletResult<()> {
        let Some(api) = &self.coordinator_api else {
            return Ok(());
        };
        match api.wallet_exists(key_id, token).await {
            Ok(true) => Err(WalletError::AlreadyExists(key_id.to_string())),
            Ok(false) => Ok(()),
            Err(e) => {
                tracing::warn!(key_id, error = %e, "wallet lookup failed, continuing");
                Ok(())
            }
        }
    }

    async fn persist_key_identifier(&self, key_id: &str) {
        let record = ShareRecord::new(self.options.metadata_key.as_str(), key_id.as_bytes());
        if let Err(e) = self.storage.save(&record).await {
            tracing::warn!(key_id, error = %e, "failed to persist current key metadata");
        }
    }

    /// Coordinator upload, local copy, then third-party upload.
    ///
    /// Returns whether the coordinator acknowledged its fragment.
    async fn distribute_backup(
        &self,
        connection: &CoordinatorConnection,
        key_id: &str,
        backup: &DeviceBackupArtifacts,
    ) -> bool {
        let upload = upload_backup_fragment(
            connection.transport.as_ref(),
            &connection.session_id,
            key_id,
            backup,
            &self.options.upload,
        )
        .await;
        let stored = match upload {
            Ok(outcome) => outcome == UploadOutcome::Acknowledged,
            Err(e) => {
                tracing::warn!(key_id, error = %e, "failed to upload coordinator backup fragment");
                false
            }
        };

        persist_device_backup_locally(self.storage.as_ref(), key_id, backup).await;

        if let Some(host) = &self.fragment_host {
            let share_index = self.options.third_party_share_index;
            if let Err(e) = upload_third_party_fragment(host.as_ref(), key_id, backup, share_index).await {
                tracing::warn!(key_id, error = %e, "failed to upload third-party backup fragment");
            }
        }
        stored
    }
}

impl<E: MpcEngine> fmt::Debug for DeviceWallet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceWallet")
            .field("options", &self.options)
            .field("coordinator_api", &self.coordinator_api.is_some())
            .field("fragment_host", &self.fragment_host.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let mut config = TandemConfig::default();
        config.recovery.metadata_key = "custom:key".to_string();
        config.backup.third_party_share_index = 2;
        config.backup.ack_timeout_ms = 250;

        let options = WalletOptions::from_config("ws://coordinator", &config);
        assert_eq!(options.server_url, "ws://coordinator");
        assert_eq!(options.metadata_key, "custom:key");
        assert_eq!(options.third_party_share_index, 2);
        assert_eq!(options.upload.ack_timeout.as_millis(), 250);
        assert_eq!(options.backup.threshold, Some(config.backup.default_threshold));
    }
}
