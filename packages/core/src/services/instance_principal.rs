//! Instance principal credentials for code running on an OCI compute instance.
//!
//! The instance metadata service hands out a leaf certificate, its private
//! key and an intermediate certificate. Those are exchanged at the identity
//! federation endpoint, together with a freshly generated session public
//! key, for a short-lived security token. Provider requests are then signed
//! with the session key under `keyId="ST$<token>"`.
//!
//! The token is fetched lazily on first use and again shortly before it
//! expires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Request, StatusCode};
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::services::signer::{parse_private_key, RequestAuthorizer, RequestSigner};
use crate::suppression::{error::ProviderResult, ProviderError};

pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254/opc/v2";
const METADATA_AUTHORIZATION: &str = "Bearer Oracle";
const SESSION_KEY_BITS: usize = 2048;
/// Tokens this close to expiry are replaced before use.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Identity federation endpoint for a region.
pub fn federation_endpoint_for_region(region: &str) -> String {
    format!("https://auth.{}.oraclecloud.com", region)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FederationRequest {
    certificate: String,
    public_key: String,
    intermediate_certificates: Vec<String>,
    purpose: &'static str,
    fingerprint_algorithm: &'static str,
}

#[derive(Debug, Deserialize)]
struct FederationResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: i64,
}

/// A security token and the session key it was issued for.
struct Session {
    signer: RequestSigner,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

pub struct InstancePrincipalAuth {
    http: Client,
    metadata_url: String,
    federation_url: String,
    tenancy_ocid: String,
    session_key_bits: usize,
    session: Mutex<Option<Arc<Session>>>,
}

impl std::fmt::Debug for InstancePrincipalAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePrincipalAuth")
            .field("metadata_url", &self.metadata_url)
            .field("federation_url", &self.federation_url)
            .field("tenancy_ocid", &self.tenancy_ocid)
            .finish_non_exhaustive()
    }
}

impl InstancePrincipalAuth {
    pub fn new(
        metadata_url: String,
        federation_url: String,
        tenancy_ocid: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("email-suppression-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Config(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            http,
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            federation_url: federation_url.trim_end_matches('/').to_string(),
            tenancy_ocid,
            session_key_bits: SESSION_KEY_BITS,
            session: Mutex::new(None),
        })
    }

    /// Size of the RSA session keys generated at each refresh.
    pub fn with_session_key_bits(mut self, bits: usize) -> Self {
        self.session_key_bits = bits;
        self
    }

    /// Current session, federating again when it is missing or about to expire.
    async fn session(&self) -> ProviderResult<Arc<Session>> {
        let mut current = self.session.lock().await;
        if let Some(session) = current.as_ref() {
            if session.is_fresh(Utc::now()) {
                return Ok(session.clone());
            }
            tracing::info!(expires_at = %session.expires_at, "Security token expiring, refreshing");
        }

        let session = Arc::new(self.federate().await?);
        *current = Some(session.clone());
        Ok(session)
    }

    async fn federate(&self) -> ProviderResult<Session> {
        let leaf_certificate = self.metadata("identity/cert.pem").await?;
        let leaf_key = self.metadata("identity/key.pem").await?;
        let intermediate_certificate = self.metadata("identity/intermediate.pem").await?;

        let leaf_key = parse_private_key(&leaf_key)
            .map_err(|e| ProviderError::auth(format!("Instance metadata returned an unusable key: {}", e)))?;
        let federation_signer = RequestSigner::with_key(
            federation_key_id(&self.tenancy_ocid, &leaf_certificate)?,
            leaf_key,
        );

        let bits = self.session_key_bits;
        let session_key = tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut rand::thread_rng(), bits))
            .await
            .map_err(|e| ProviderError::transient(format!("Session key generation did not finish: {}", e)))?
            .map_err(|e| ProviderError::protocol(format!("Failed to generate session key: {}", e)))?;
        let public_key = RsaPublicKey::from(&session_key)
            .to_public_key_der()
            .map_err(|e| ProviderError::protocol(format!("Failed to encode session key: {}", e)))?;

        let body = FederationRequest {
            certificate: pem_body(&leaf_certificate),
            public_key: STANDARD.encode(public_key.as_bytes()),
            intermediate_certificates: vec![pem_body(&intermediate_certificate)],
            purpose: "DEFAULT",
            fingerprint_algorithm: "SHA256",
        };
        let mut request = self
            .http
            .post(format!("{}/v1/x509", self.federation_url))
            .json(&body)
            .build()
            .map_err(|e| ProviderError::protocol(format!("Failed to build federation request: {}", e)))?;
        federation_signer.sign(&mut request, Utc::now())?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ProviderError::transient(format!("Federation request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(
                status,
                format!("Federation endpoint returned HTTP {}", status.as_u16()),
            ));
        }
        let token = response
            .json::<FederationResponse>()
            .await
            .map_err(|e| ProviderError::protocol(format!("Failed to parse federation response: {}", e)))?
            .token;

        let expires_at = token_expiry(&token)?;
        tracing::info!(%expires_at, "Obtained instance principal security token");

        Ok(Session {
            signer: RequestSigner::with_key(format!("ST${}", token), session_key),
            expires_at,
        })
    }

    async fn metadata(&self, path: &str) -> ProviderResult<String> {
        let response = self
            .http
            .get(format!("{}/{}", self.metadata_url, path))
            .header(AUTHORIZATION, METADATA_AUTHORIZATION)
            .send()
            .await
            .map_err(|e| ProviderError::transient(format!("Instance metadata request for {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(
                status,
                format!("Instance metadata returned HTTP {} for {}", status.as_u16(), path),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::transient(format!("Failed to read instance metadata {}: {}", path, e)))
    }
}

#[async_trait]
impl RequestAuthorizer for InstancePrincipalAuth {
    async fn authorize(&self, request: &mut Request) -> ProviderResult<()> {
        let session = self.session().await?;
        session.signer.sign(request, Utc::now())
    }
}

fn status_error(status: StatusCode, detail: String) -> ProviderError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            ProviderError::auth(detail)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ProviderError::transient(detail),
        s if s.is_server_error() => ProviderError::transient(detail),
        _ => ProviderError::protocol(detail),
    }
}

/// Base64 payload of a PEM block, without armour lines or line breaks.
fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

/// Key id for the federation call: tenancy plus the leaf certificate's
/// SHA-256 fingerprint as colon-separated uppercase hex.
fn federation_key_id(tenancy_ocid: &str, certificate_pem: &str) -> ProviderResult<String> {
    let der = STANDARD
        .decode(pem_body(certificate_pem))
        .map_err(|e| ProviderError::auth(format!("Instance metadata returned an unreadable certificate: {}", e)))?;
    let fingerprint = Sha256::digest(&der)
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":");
    Ok(format!("{}/fed-x509-sha256/{}", tenancy_ocid, fingerprint))
}

/// Expiry (`exp` claim) of a JWT security token.
fn token_expiry(token: &str) -> ProviderResult<DateTime<Utc>> {
    let malformed = |reason: &str| ProviderError::protocol(format!("Malformed security token: {}", reason));

    let claims = token.split('.').nth(1).ok_or_else(|| malformed("no claims segment"))?;
    let claims = URL_SAFE_NO_PAD
        .decode(claims.trim_end_matches('='))
        .map_err(|_| malformed("claims are not base64url"))?;
    let claims: TokenClaims = serde_json::from_slice(&claims).map_err(|_| malformed("no exp claim"))?;

    Utc.timestamp_opt(claims.exp, 0)
        .single()
        .ok_or_else(|| malformed("exp out of range"))
}
