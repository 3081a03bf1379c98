//! Device wallet against a live coordinator server

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tandem_coordinator::{CoordinatorServer, StandardSessionPolicy};
use tandem_core::config::DEFAULT_METADATA_KEY;
use tandem_core::{
    BackupShareFrame, DriverConfig, InMemoryShareStorage, IntentKind, ShareStorage, TandemConfig,
};
use tandem_recovery::{
    device_backup_key, CoordinatorApi, FragmentHost, RecoveryArtifact, RecoveryError,
    RecoveryResult, UploadOptions,
};
use tandem_testkit::{high_s_compact, init_test_tracing, StubEngine};
use tandem_wallet::{
    connect_to_coordinator, ConnectOptions, CreateKeyOptions, DeviceWallet, SignBytesOptions,
    WalletError, WalletOptions,
};

fn server_config() -> TandemConfig {
    let mut config = TandemConfig::default();
    config.server.bind_addr = "127.0.0.1:0".to_string();
    config.server.handshake_timeout_ms = 1_000;
    config.server.backup_wait_ms = 3_000;
    config.driver.poll_interval_ms = 1;
    config.driver.peer_timeout_ms = 5_000;
    config.backup.ack_poll_interval_ms = 5;
    config
}

struct Deployment {
    server: CoordinatorServer<StubEngine>,
    server_storage: Arc<InMemoryShareStorage>,
}

impl Deployment {
    async fn start() -> Self {
        init_test_tracing();
        let config = server_config();
        let server_storage = Arc::new(InMemoryShareStorage::new());
        let policy = StandardSessionPolicy::from_config(server_storage.clone(), &config);
        let server = CoordinatorServer::bind(
            &config,
            server_storage.clone(),
            Arc::new(StubEngine::new()),
            Arc::new(policy),
        )
        .await
        .unwrap();
        Self {
            server,
            server_storage,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.server.local_addr())
    }

    fn wallet(&self, storage: Arc<InMemoryShareStorage>) -> DeviceWallet<StubEngine> {
        let mut options = WalletOptions::new(self.url());
        options.driver = DriverConfig {
            poll_interval_ms: 1,
            peer_timeout_ms: 5_000,
            ..DriverConfig::default()
        };
        options.upload = UploadOptions {
            ack_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(5),
            ..UploadOptions::default()
        };
        DeviceWallet::new(Arc::new(StubEngine::new()), storage, options)
    }
}

/// Coordinator API answering from the coordinator's own share storage
struct StoredArtifactApi {
    storage: Arc<InMemoryShareStorage>,
    lookup: Lookup,
}

#[derive(Clone, Copy)]
enum Lookup {
    Exists,
    Absent,
    Failing,
}

#[async_trait]
impl CoordinatorApi for StoredArtifactApi {
    async fn wallet_exists(&self, _wallet_id: &str, _token: Option<&str>) -> RecoveryResult<bool> {
        match self.lookup {
            Lookup::Exists => Ok(true),
            Lookup::Absent => Ok(false),
            Lookup::Failing => Err(RecoveryError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            }),
        }
    }

    async fn fetch_recovery_artifact(
        &self,
        wallet_id: &str,
        _token: Option<&str>,
    ) -> RecoveryResult<RecoveryArtifact> {
        let record = self
            .storage
            .load(&format!("{wallet_id}:backup:coordinator"))
            .await?
            .ok_or(RecoveryError::Http {
                status: 404,
                body: String::new(),
            })?;
        let frame = BackupShareFrame::parse(&record.blob)
            .ok_or_else(|| RecoveryError::invalid_payload("stored frame"))?;
        Ok(RecoveryArtifact {
            ciphertext: frame.ciphertext.decode()?,
            fragment: frame.decode_share()?.unwrap_or_default(),
        })
    }
}

#[derive(Default)]
struct MemoryFragmentHost {
    fragments: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FragmentHost for MemoryFragmentHost {
    async fn fetch_fragment(&self, wallet_id: &str) -> RecoveryResult<Vec<u8>> {
        self.fragments
            .lock()
            .get(wallet_id)
            .cloned()
            .ok_or(RecoveryError::Http {
                status: 404,
                body: String::new(),
            })
    }

    async fn upload_fragment(&self, wallet_id: &str, fragment: &[u8]) -> RecoveryResult<()> {
        self.fragments
            .lock()
            .insert(wallet_id.to_string(), fragment.to_vec());
        Ok(())
    }
}

async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn create_beef() -> CreateKeyOptions {
    CreateKeyOptions {
        key_id: Some(vec![0xbe, 0xef]),
        ..CreateKeyOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_key_persists_shares_and_distributes_backup() {
    let deployment = Deployment::start().await;
    let device_storage = Arc::new(InMemoryShareStorage::new());
    let host = Arc::new(MemoryFragmentHost::default());
    let wallet = deployment
        .wallet(device_storage.clone())
        .with_fragment_host(host.clone());

    let created = wallet.create_key(create_beef()).await.unwrap();
    assert_eq!(created.key_id, "beef");
    assert_eq!(created.session_id.len(), 32);
    assert!(created.coordinator_fragment_stored);
    let backup = created.backup.unwrap();

    assert!(device_storage.load("beef").await.unwrap().is_some());
    assert_eq!(wallet.current_key_id().await.unwrap().as_deref(), Some("beef"));
    assert!(device_storage.load(&device_backup_key("beef")).await.unwrap().is_some());
    assert_eq!(host.fragments.lock().get("beef"), Some(&backup.shares[1]));

    let server_storage = deployment.server_storage.clone();
    assert!(server_storage.load("beef:server").await.unwrap().is_some());
    let stored = server_storage
        .load("beef:backup:coordinator")
        .await
        .unwrap()
        .unwrap();
    let frame = BackupShareFrame::parse(&stored.blob).unwrap();
    assert_eq!(frame.decode_share().unwrap(), Some(backup.shares[0].clone()));

    let registry = deployment.server.registry().clone();
    assert!(eventually(|| {
        let registry = registry.clone();
        async move { registry.session_count() == 0 }
    })
    .await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sign_bytes_uses_the_current_key() {
    let deployment = Deployment::start().await;
    let wallet = deployment.wallet(Arc::new(InMemoryShareStorage::new()));
    wallet.create_key(create_beef()).await.unwrap();

    let signed = wallet
        .sign_bytes(SignBytesOptions {
            message: b"transfer 10".to_vec(),
            ..SignBytesOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(signed.signature, high_s_compact());
    assert_eq!(signed.format, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sign_bytes_without_a_key_fails_before_connecting() {
    let deployment = Deployment::start().await;
    let wallet = deployment.wallet(Arc::new(InMemoryShareStorage::new()));

    assert_matches!(
        wallet
            .sign_bytes(SignBytesOptions {
                message: b"m".to_vec(),
                ..SignBytesOptions::default()
            })
            .await,
        Err(WalletError::NoKey)
    );
    assert_matches!(
        wallet
            .sign_bytes(SignBytesOptions {
                key_id: Some(vec![0x01]),
                message: b"m".to_vec(),
                ..SignBytesOptions::default()
            })
            .await,
        Err(WalletError::MissingShare(key)) if key == "01"
    );
    assert_eq!(deployment.server.registry().session_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn existing_remote_wallet_blocks_create_key() {
    let deployment = Deployment::start().await;
    let device_storage = Arc::new(InMemoryShareStorage::new());
    let wallet = deployment
        .wallet(device_storage.clone())
        .with_coordinator_api(Arc::new(StoredArtifactApi {
            storage: deployment.server_storage.clone(),
            lookup: Lookup::Exists,
        }));

    assert_matches!(
        wallet.create_key(create_beef()).await,
        Err(WalletError::AlreadyExists(key)) if key == "beef"
    );
    assert!(device_storage.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_existence_lookup_does_not_block_create_key() {
    let deployment = Deployment::start().await;
    let wallet = deployment
        .wallet(Arc::new(InMemoryShareStorage::new()))
        .with_coordinator_api(Arc::new(StoredArtifactApi {
            storage: deployment.server_storage.clone(),
            lookup: Lookup::Failing,
        }));

    let created = wallet.create_key(create_beef()).await.unwrap();
    assert_eq!(created.key_id, "beef");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lost_device_recovers_from_coordinator_and_host_fragments() {
    let deployment = Deployment::start().await;
    let host = Arc::new(MemoryFragmentHost::default());
    let original_storage = Arc::new(InMemoryShareStorage::new());
    deployment
        .wallet(original_storage.clone())
        .with_fragment_host(host.clone())
        .create_key(create_beef())
        .await
        .unwrap();

    let replacement_storage = Arc::new(InMemoryShareStorage::new());
    let replacement = deployment
        .wallet(replacement_storage.clone())
        .with_coordinator_api(Arc::new(StoredArtifactApi {
            storage: deployment.server_storage.clone(),
            lookup: Lookup::Absent,
        }))
        .with_fragment_host(host);

    let recovered = replacement.recover_key(&[0xbe, 0xef], None).await.unwrap();
    assert_eq!(recovered.fragments_used, 2);

    let original = original_storage.load("beef").await.unwrap().unwrap();
    let restored = replacement_storage.load("beef").await.unwrap().unwrap();
    assert_eq!(restored.blob, original.blob);
    let pointer = replacement_storage
        .load(DEFAULT_METADATA_KEY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pointer.blob, b"beef".to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_needs_a_coordinator_api() {
    let deployment = Deployment::start().await;
    let wallet = deployment.wallet(Arc::new(InMemoryShareStorage::new()));

    assert_matches!(
        wallet.recover_key(&[0xbe, 0xef], None).await,
        Err(WalletError::Recovery(RecoveryError::NotConfigured(_)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_registers_and_closes_a_session() {
    let deployment = Deployment::start().await;
    let connection = connect_to_coordinator(ConnectOptions {
        intent: IntentKind::Sign,
        key_id: Some("0bad".to_string()),
        message: Some(b"m".to_vec()),
        ..ConnectOptions::new(deployment.url())
    })
    .await
    .unwrap();
    assert_eq!(connection.session_id.len(), 32);
    assert!(connection.is_open());

    connection.close();
    connection.close();
    assert!(!connection.is_open());

    let registry = deployment.server.registry().clone();
    assert!(eventually(|| {
        let registry = registry.clone();
        async move { registry.session_count() == 0 }
    })
    .await);
}
