//! Recovery Orchestrator
//!
//! Collects fragments for a key from up to three sources, in order: the
//! coordinator's recovery artifact, the device-local backup, and the
//! third-party fragment host. Sources are consulted only while the set is
//! still below the ciphertext threshold. Once the threshold is met the
//! restore primitive runs exactly once and the recovered share becomes the
//! current key.

use crate::http::{CoordinatorApi, FragmentHost, HttpCoordinatorApi, HttpFragmentHost};
use crate::local::load_persisted_device_backup;
use crate::{RecoveryError, RecoveryResult};
use std::fmt;
use std::sync::Arc;
use tandem_core::config::DEFAULT_METADATA_KEY;
use tandem_core::{MpcEngine, RecoveryConfig, SessionContext, ShareRecord, ShareStorage};

/// A key share rebuilt from backup fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredKey {
    /// Key the share belongs to
    pub key_id: String,
    /// Exported share, as persisted under `key_id`
    pub share: Vec<u8>,
    /// Fragments handed to the restore primitive
    pub fragments_used: usize,
}

/// Fragment set with insertion order preserved and duplicates dropped
#[derive(Debug, Default)]
struct FragmentSet {
    fragments: Vec<Vec<u8>>,
}

impl FragmentSet {
    fn insert(&mut self, fragment: Vec<u8>) -> bool {
        if fragment.is_empty() || self.fragments.contains(&fragment) {
            return false;
        }
        self.fragments.push(fragment);
        true
    }

    fn len(&self) -> usize {
        self.fragments.len()
    }
}

/// Rebuilds device key shares from distributed backup fragments
pub struct RecoveryOrchestrator<E: MpcEngine> {
    engine: Arc<E>,
    storage: Arc<dyn ShareStorage>,
    coordinator_api: Option<Arc<dyn CoordinatorApi>>,
    fragment_host: Option<Arc<dyn FragmentHost>>,
    metadata_key: String,
}

impl<E: MpcEngine> RecoveryOrchestrator<E> {
    /// Orchestrator with no remote collaborators configured
    pub fn new(engine: Arc<E>, storage: Arc<dyn ShareStorage>) -> Self {
        Self {
            engine,
            storage,
            coordinator_api: None,
            fragment_host: None,
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
        }
    }

    /// Orchestrator wired to the HTTP collaborators named in `config`
    pub fn from_config(
        engine: Arc<E>,
        storage: Arc<dyn ShareStorage>,
        config: &RecoveryConfig,
    ) -> RecoveryResult<Self> {
        let mut orchestrator =
            Self::new(engine, storage).with_metadata_key(config.metadata_key.clone());
        if let Some(url) = &config.api_base_url {
            orchestrator = orchestrator.with_coordinator_api(Arc::new(HttpCoordinatorApi::new(url)?));
        }
        if let Some(url) = &config.fragment_host_url {
            let host = HttpFragmentHost::new(url, config.fragment_host_token.clone())?;
            orchestrator = orchestrator.with_fragment_host(Arc::new(host));
        }
        Ok(orchestrator)
    }

    /// Use `api` for recovery artifacts
    pub fn with_coordinator_api(mut self, api: Arc<dyn CoordinatorApi>) -> Self {
        self.coordinator_api = Some(api);
        self
    }

    /// Use `host` as the last fragment source
    pub fn with_fragment_host(mut self, host: Arc<dyn FragmentHost>) -> Self {
        self.fragment_host = Some(host);
        self
    }

    /// Storage key of the current-key pointer
    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = key.into();
        self
    }

    /// Coordinator API in use, if any
    pub fn coordinator_api(&self) -> Option<&Arc<dyn CoordinatorApi>> {
        self.coordinator_api.as_ref()
    }

    /// Fragment host in use, if any
    pub fn fragment_host(&self) -> Option<&Arc<dyn FragmentHost>> {
        self.fragment_host.as_ref()
    }

    /// Recover the share for `key_id`.
    ///
    /// Nothing is persisted unless the restore succeeds.
    pub async fn recover(&self, key_id: &str, token: Option<&str>) -> RecoveryResult<RecoveredKey> {
        let api = self
            .coordinator_api
            .as_ref()
            .ok_or(RecoveryError::NotConfigured("coordinator API"))?;
        let artifact = api.fetch_recovery_artifact(key_id, token).await?;
        artifact.ciphertext.validate()?;
        let need = artifact.ciphertext.threshold as usize;

        let mut set = FragmentSet::default();
        set.insert(artifact.fragment);
        tracing::debug!(key_id, have = set.len(), need, "coordinator fragment fetched");

        if set.len() < need {
            self.add_local_fragments(key_id, &mut set, need).await;
        }
        if set.len() < need {
            self.add_host_fragment(key_id, &mut set).await;
        }
        if set.len() < need {
            return Err(RecoveryError::InsufficientFragments {
                have: set.len(),
                need,
            });
        }

        let ctx = SessionContext::open(Arc::clone(&self.engine))?;
        let restored = self
            .engine
            .backup_restore(ctx.raw(), &artifact.ciphertext, &set.fragments)
            .and_then(|keypair| self.engine.keypair_export(ctx.raw(), &keypair));
        ctx.release();
        let share = restored?;

        self.storage
            .save(&ShareRecord::new(key_id, share.clone()))
            .await?;
        if let Err(e) = self
            .storage
            .save(&ShareRecord::new(self.metadata_key.as_str(), key_id.as_bytes()))
            .await
        {
            tracing::warn!(key_id, error = %e, "failed to update current key metadata");
        }

        tracing::info!(key_id, fragments = set.len(), "wallet key recovered");
        Ok(RecoveredKey {
            key_id: key_id.to_string(),
            share,
            fragments_used: set.len(),
        })
    }

    async fn add_local_fragments(&self, key_id: &str, set: &mut FragmentSet, need: usize) {
        match load_persisted_device_backup(self.storage.as_ref(), key_id).await {
            Ok(Some(backup)) => {
                for share in backup.shares {
                    if set.len() >= need {
                        break;
                    }
                    set.insert(share);
                }
                tracing::debug!(key_id, have = set.len(), "local backup consulted");
            }
            Ok(None) => tracing::debug!(key_id, "no local backup"),
            Err(e) => tracing::warn!(key_id, error = %e, "local backup unreadable"),
        }
    }

    async fn add_host_fragment(&self, key_id: &str, set: &mut FragmentSet) {
        let Some(host) = &self.fragment_host else {
            tracing::debug!(key_id, "no fragment host configured");
            return;
        };
        match host.fetch_fragment(key_id).await {
            Ok(fragment) => {
                if !set.insert(fragment) {
                    tracing::debug!(key_id, "fragment host returned a duplicate");
                }
            }
            Err(e) => tracing::warn!(key_id, error = %e, "fragment host fetch failed"),
        }
    }
}

impl<E: MpcEngine> fmt::Debug for RecoveryOrchestrator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("coordinator_api", &self.coordinator_api.is_some())
            .field("fragment_host", &self.fragment_host.is_some())
            .field("metadata_key", &self.metadata_key)
            .finish_non_exhaustive()
    }
}
