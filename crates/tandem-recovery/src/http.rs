//! HTTP collaborators
//!
//! The coordinator's REST API answers wallet-existence lookups and hands out
//! its recovery artifact; a third-party fragment host stores one more
//! fragment. Both sit behind traits so recovery can be exercised without a
//! network.

use crate::{RecoveryError, RecoveryResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tandem_core::{codec, BackupCiphertext, DeviceBackupArtifacts};
use url::Url;

/// Coordinator-held half of a recovery: ciphertext plus one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryArtifact {
    /// Backup metadata and ciphertext
    pub ciphertext: BackupCiphertext,
    /// Fragment held by the coordinator
    pub fragment: Vec<u8>,
}

/// Coordinator REST API
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// Whether a wallet is already registered for `wallet_id`
    async fn wallet_exists(&self, wallet_id: &str, token: Option<&str>) -> RecoveryResult<bool>;

    /// Ciphertext and coordinator fragment for `wallet_id`
    async fn fetch_recovery_artifact(
        &self,
        wallet_id: &str,
        token: Option<&str>,
    ) -> RecoveryResult<RecoveryArtifact>;
}

/// Third-party fragment host
#[async_trait]
pub trait FragmentHost: Send + Sync {
    /// Fragment stored for `wallet_id`
    async fn fetch_fragment(&self, wallet_id: &str) -> RecoveryResult<Vec<u8>>;

    /// Store `fragment` for `wallet_id`
    async fn upload_fragment(&self, wallet_id: &str, fragment: &[u8]) -> RecoveryResult<()>;
}

/// Normalize a base URL: validated, without trailing slashes
pub fn normalize_base_url(base_url: &str) -> RecoveryResult<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|e| RecoveryError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(trimmed.to_string())
}

fn with_bearer(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn error_for(response: Response) -> RecoveryError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RecoveryError::Http { status, body }
}

#[derive(Debug, Deserialize)]
struct ExistsBody {
    exists: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryPayload {
    ciphertext: RecoveryCiphertextPayload,
    fragment: String,
    fragment_encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryCiphertextPayload {
    kind: String,
    curve: String,
    scheme: String,
    key_id: String,
    key_id_encoding: Option<String>,
    threshold: u32,
    share_count: u32,
    #[serde(default)]
    label: String,
    label_encoding: Option<String>,
    blob: String,
    blob_encoding: Option<String>,
}

impl RecoveryCiphertextPayload {
    fn decode(&self) -> RecoveryResult<BackupCiphertext> {
        Ok(BackupCiphertext {
            kind: self.kind.clone(),
            curve: self.curve.clone(),
            scheme: self.scheme.clone(),
            key_id: codec::decode_by_encoding(&self.key_id, self.key_id_encoding.as_deref())?,
            threshold: self.threshold,
            share_count: self.share_count,
            label: codec::decode_by_encoding(&self.label, self.label_encoding.as_deref())?,
            blob: codec::decode_by_encoding(&self.blob, self.blob_encoding.as_deref())?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FragmentBody {
    #[serde(default)]
    fragment: String,
}

/// [`CoordinatorApi`] over reqwest
#[derive(Debug, Clone)]
pub struct HttpCoordinatorApi {
    client: Client,
    base_url: String,
}

impl HttpCoordinatorApi {
    /// Client for the API rooted at `base_url`
    pub fn new(base_url: &str) -> RecoveryResult<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// Normalized base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinatorApi {
    async fn wallet_exists(&self, wallet_id: &str, token: Option<&str>) -> RecoveryResult<bool> {
        let url = format!("{}/wallets/{wallet_id}", self.base_url);
        tracing::debug!(%url, "wallet lookup");
        let response = with_bearer(self.client.get(&url), token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                match serde_json::from_str::<ExistsBody>(&body) {
                    Ok(parsed) => Ok(parsed.exists.unwrap_or(true)),
                    Err(e) => {
                        tracing::debug!(error = %e, "wallet lookup body is not JSON");
                        Ok(true)
                    }
                }
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_for(response).await),
        }
    }

    async fn fetch_recovery_artifact(
        &self,
        wallet_id: &str,
        token: Option<&str>,
    ) -> RecoveryResult<RecoveryArtifact> {
        let url = format!("{}/wallets/{wallet_id}/recovery", self.base_url);
        let response = with_bearer(self.client.get(&url), token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(error_for(response).await);
        }

        let payload: RecoveryPayload = serde_json::from_str(&response.text().await?)?;
        let fragment = match payload.fragment_encoding.as_deref() {
            Some("hex") => codec::from_hex(&payload.fragment)?,
            _ => codec::from_base64(&payload.fragment)?,
        };
        Ok(RecoveryArtifact {
            ciphertext: payload.ciphertext.decode()?,
            fragment,
        })
    }
}

/// [`FragmentHost`] over reqwest
#[derive(Debug, Clone)]
pub struct HttpFragmentHost {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFragmentHost {
    /// Client for the host rooted at `base_url`, authenticating with `token`
    pub fn new(base_url: &str, token: Option<String>) -> RecoveryResult<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: normalize_base_url(base_url)?,
            token,
        })
    }

    fn fragment_url(&self, wallet_id: &str) -> String {
        format!("{}/fragments/{wallet_id}", self.base_url)
    }
}

#[async_trait]
impl FragmentHost for HttpFragmentHost {
    async fn fetch_fragment(&self, wallet_id: &str) -> RecoveryResult<Vec<u8>> {
        let response = with_bearer(self.client.get(self.fragment_url(wallet_id)), self.token.as_deref())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(error_for(response).await);
        }
        let body: FragmentBody = serde_json::from_str(&response.text().await?)?;
        if body.fragment.is_empty() {
            return Err(RecoveryError::invalid_payload(
                "fragment host response missing fragment",
            ));
        }
        Ok(codec::from_base64(&body.fragment)?)
    }

    async fn upload_fragment(&self, wallet_id: &str, fragment: &[u8]) -> RecoveryResult<()> {
        let body = FragmentBody {
            fragment: codec::to_base64(fragment),
        };
        let response = with_bearer(self.client.post(self.fragment_url(wallet_id)), self.token.as_deref())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }
        tracing::info!(wallet_id, "uploaded third-party fragment");
        Ok(())
    }
}

/// Default fragment index held by the third-party host
pub const DEFAULT_THIRD_PARTY_SHARE_INDEX: usize = 1;

/// Push fragment `share_index` of `backup` to `host`.
///
/// Returns `false` without a request when no fragment exists at that index.
pub async fn upload_third_party_fragment(
    host: &dyn FragmentHost,
    wallet_id: &str,
    backup: &DeviceBackupArtifacts,
    share_index: usize,
) -> RecoveryResult<bool> {
    let Some(share) = backup.share(share_index) else {
        tracing::warn!(wallet_id, share_index, "no share available for third-party upload");
        return Ok(false);
    };
    host.upload_fragment(wallet_id, share).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_are_normalized() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/").unwrap(),
            "https://api.example.com/v1"
        );
        assert!(matches!(
            normalize_base_url("not a url"),
            Err(RecoveryError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn recovery_ciphertext_honors_encodings() {
        let payload: RecoveryCiphertextPayload = serde_json::from_str(
            r#"{"kind":"device-backup","curve":"secp256k1","scheme":"s","keyId":"AQI=",
                "keyIdEncoding":"base64","threshold":2,"shareCount":3,"label":"","blob":"beef"}"#,
        )
        .unwrap();
        let ciphertext = payload.decode().unwrap();
        assert_eq!(ciphertext.key_id, vec![1, 2]);
        assert!(ciphertext.label.is_empty());
        assert_eq!(ciphertext.blob, vec![0xbe, 0xef]);
    }
}
