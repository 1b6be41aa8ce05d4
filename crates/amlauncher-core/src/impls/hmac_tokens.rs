//! HmacTokenIssuer - master key から attempt ごとの token を導出
//!
//! # 学習ポイント
//! - `Hmac<Sha256>` による決定的な secret 導出
//! - 鍵は構築時に固定（読み取り専用の共有状態）

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::domain::{AttemptIdentity, LauncherError, SecurityToken};
use crate::ports::TokenIssuer;

type HmacSha256 = Hmac<Sha256>;

pub const AM_RM_TOKEN_KIND: &str = "YARN_AM_RM_TOKEN";
pub const CLIENT_TOKEN_KIND: &str = "YARN_CLIENT_TOKEN";

const MASTER_KEY_LEN: usize = 32;

/// Token secret = HMAC-SHA256(master key, canonical attempt string).
///
/// Keys are fixed at construction; the same attempt always gets the same
/// secret from the same issuer.
pub struct HmacTokenIssuer {
    application_key: Vec<u8>,
    client_key: Vec<u8>,
}

impl HmacTokenIssuer {
    pub fn new(application_key: Vec<u8>, client_key: Vec<u8>) -> Self {
        Self {
            application_key,
            client_key,
        }
    }

    /// Issuer with freshly generated master keys.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut application_key = vec![0u8; MASTER_KEY_LEN];
        let mut client_key = vec![0u8; MASTER_KEY_LEN];
        rng.fill_bytes(&mut application_key);
        rng.fill_bytes(&mut client_key);
        Self::new(application_key, client_key)
    }

    fn sign(
        key: &[u8],
        kind: &str,
        attempt: AttemptIdentity,
    ) -> Result<SecurityToken, LauncherError> {
        if attempt.application_id().is_none() {
            return Err(LauncherError::Configuration(format!(
                "cannot issue {kind} for unresolved attempt {attempt}"
            )));
        }
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| LauncherError::Configuration(format!("bad {kind} master key: {e}")))?;
        let service = attempt.to_string();
        mac.update(service.as_bytes());
        let secret = mac.finalize().into_bytes().to_vec();
        Ok(SecurityToken::new(kind, service, secret))
    }
}

impl std::fmt::Debug for HmacTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenIssuer").finish_non_exhaustive()
    }
}

impl TokenIssuer for HmacTokenIssuer {
    fn application_token(&self, attempt: AttemptIdentity) -> Result<SecurityToken, LauncherError> {
        Self::sign(&self.application_key, AM_RM_TOKEN_KIND, attempt)
    }

    fn client_token(&self, attempt: AttemptIdentity) -> Result<SecurityToken, LauncherError> {
        Self::sign(&self.client_key, CLIENT_TOKEN_KIND, attempt)
    }
}
