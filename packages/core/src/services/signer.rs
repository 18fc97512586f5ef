//! OCI HTTP request signing (draft-cavage signatures, version 1).
//!
//! Every request carries `date`, `host` and an `authorization` header whose
//! signature covers `date`, `(request-target)` and `host`. Requests with a
//! body also sign `content-length`, `content-type` and `x-content-sha256`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Request, Url};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::suppression::{error::ProviderResult, ProviderError};

const REQUEST_TARGET: &str = "(request-target)";
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Attaches credentials to an outgoing provider request.
#[async_trait]
pub trait RequestAuthorizer: Send + Sync {
    async fn authorize(&self, request: &mut Request) -> ProviderResult<()>;
}

/// Signs provider requests with an RSA key under a fixed key id.
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// Build a user API key signer from a PEM-encoded RSA key (PKCS#8 or PKCS#1).
    pub fn new(
        tenancy_ocid: &str,
        user_ocid: &str,
        fingerprint: &str,
        private_key_pem: &str,
    ) -> Result<Self, AppError> {
        let private_key = parse_private_key(private_key_pem)
            .map_err(|e| AppError::Config(format!("Invalid OCI private key: {}", e)))?;

        Ok(Self::with_key(
            format!("{}/{}/{}", tenancy_ocid, user_ocid, fingerprint),
            private_key,
        ))
    }

    pub fn with_key(key_id: String, private_key: RsaPrivateKey) -> Self {
        Self {
            key_id,
            signing_key: SigningKey::<Sha256>::new(private_key),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Add the signed headers and `authorization` to `request`.
    pub fn sign(&self, request: &mut Request, now: DateTime<Utc>) -> Result<(), ProviderError> {
        let host = host_header(request.url())
            .ok_or_else(|| ProviderError::protocol(format!("request URL has no host: {}", request.url())))?;

        let mut signed: Vec<(&'static str, String)> = vec![
            ("date", http_date(now)),
            (REQUEST_TARGET, request_target(request.method().as_str(), request.url())),
            ("host", host),
        ];

        let body = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .map(|bytes| (bytes.len(), STANDARD.encode(Sha256::digest(bytes))));
        if let Some((length, digest)) = body {
            let content_type = request
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            signed.push(("content-length", length.to_string()));
            signed.push(("content-type", content_type));
            signed.push(("x-content-sha256", digest));
        }

        let header_names: Vec<&str> = signed.iter().map(|(name, _)| *name).collect();
        let signature = self.signing_key.sign(signing_string(&signed).as_bytes());
        let authorization = format!(
            r#"Signature version="1",keyId="{}",algorithm="rsa-sha256",headers="{}",signature="{}""#,
            self.key_id,
            header_names.join(" "),
            STANDARD.encode(signature.to_bytes())
        );

        let headers = request.headers_mut();
        for (name, value) in &signed {
            if *name != REQUEST_TARGET {
                headers.insert(HeaderName::from_static(*name), header_value(value)?);
            }
        }
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }
}

#[async_trait]
impl RequestAuthorizer for RequestSigner {
    async fn authorize(&self, request: &mut Request) -> ProviderResult<()> {
        self.sign(request, Utc::now())
    }
}

/// Parse an RSA private key in PKCS#8 or PKCS#1 PEM form.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, String> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| e.to_string())
}

fn header_value(value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value)
        .map_err(|e| ProviderError::protocol(format!("invalid header value: {}", e)))
}

/// RFC 7231 HTTP-date.
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Host header as the HTTP client sends it: port only when non-default.
pub fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// `(request-target)` value: lowercase method, path and query.
pub fn request_target(method: &str, url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{} {}?{}", method.to_lowercase(), url.path(), query),
        None => format!("{} {}", method.to_lowercase(), url.path()),
    }
}

/// The exact string covered by the signature, one `name: value` per line.
pub fn signing_string(signed: &[(&str, String)]) -> String {
    signed
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::{DATE, HOST};
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use rsa::RsaPublicKey;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_api_key.pem");
    const TEST_KEY_PKCS1: &str = include_str!("../../tests/fixtures/test_api_key_pkcs1.pem");
    const CTRL_HOST: &str = "ctrl.email.ap-mumbai-1.oci.oraclecloud.com";
    const FIXED_DATE: &str = "Sun, 05 Jan 2014 21:31:40 GMT";

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, 5, 21, 31, 40).unwrap()
    }

    fn authorization_param<'a>(authorization: &'a str, name: &str) -> &'a str {
        let marker = format!(r#"{}=""#, name);
        let start = authorization.find(&marker).unwrap() + marker.len();
        let len = authorization[start..].find('"').unwrap();
        &authorization[start..start + len]
    }

    fn verify(authorization: &str, expected: &str) {
        let encoded = authorization_param(authorization, "signature");
        let signature = Signature::try_from(STANDARD.decode(encoded).unwrap().as_slice()).unwrap();
        let private_key = RsaPrivateKey::from_pkcs8_pem(TEST_KEY).unwrap();
        let verifying_key = VerifyingKey::<Sha256>::new(RsaPublicKey::from(&private_key));
        assert!(verifying_key.verify(expected.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn http_date_uses_rfc7231_format() {
        assert_eq!(http_date(fixed_time()), FIXED_DATE);
    }

    #[test]
    fn host_header_includes_non_default_port_only() {
        let with_port = Url::parse("http://127.0.0.1:8080/x").unwrap();
        let default_port = Url::parse(&format!("https://{}/x", CTRL_HOST)).unwrap();

        assert_eq!(host_header(&with_port).unwrap(), "127.0.0.1:8080");
        assert_eq!(host_header(&default_port).unwrap(), CTRL_HOST);
    }

    #[test]
    fn signing_string_covers_target_with_query() {
        let url = Url::parse(&format!(
            "https://{}/20170907/suppressions?compartmentId=ocid1.tenancy.oc1..aaa&emailAddress=user%40example.com",
            CTRL_HOST
        ))
        .unwrap();

        let s = signing_string(&[
            ("date", FIXED_DATE.to_string()),
            (REQUEST_TARGET, request_target("GET", &url)),
            ("host", CTRL_HOST.to_string()),
        ]);

        assert_eq!(
            s,
            "date: Sun, 05 Jan 2014 21:31:40 GMT\n\
             (request-target): get /20170907/suppressions?compartmentId=ocid1.tenancy.oc1..aaa&emailAddress=user%40example.com\n\
             host: ctrl.email.ap-mumbai-1.oci.oraclecloud.com"
        );
    }

    #[test]
    fn rejects_garbage_key() {
        let err = RequestSigner::new("t", "u", "f", "not a key").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn accepts_pkcs1_key() {
        let signer = RequestSigner::new("tenancy", "user", "aa:bb", TEST_KEY_PKCS1).unwrap();
        assert_eq!(signer.key_id(), "tenancy/user/aa:bb");
    }

    #[test]
    fn signed_request_verifies_with_public_key() {
        let signer = RequestSigner::new("tenancy", "user", "aa:bb", TEST_KEY).unwrap();
        let url = Url::parse(&format!(
            "https://{}/20170907/suppressions/ocid1.emailsuppression.oc1..x",
            CTRL_HOST
        ))
        .unwrap();
        let mut request = Request::new(reqwest::Method::DELETE, url.clone());

        signer.sign(&mut request, fixed_time()).unwrap();

        let headers = request.headers();
        assert_eq!(headers[DATE], FIXED_DATE);
        assert_eq!(headers[HOST], CTRL_HOST);

        let authorization = headers[AUTHORIZATION].to_str().unwrap();
        assert!(authorization.starts_with(r#"Signature version="1",keyId="tenancy/user/aa:bb",algorithm="rsa-sha256""#));
        assert_eq!(authorization_param(authorization, "headers"), "date (request-target) host");

        verify(
            authorization,
            &signing_string(&[
                ("date", FIXED_DATE.to_string()),
                (REQUEST_TARGET, request_target("DELETE", &url)),
                ("host", CTRL_HOST.to_string()),
            ]),
        );
    }

    #[test]
    fn request_body_is_covered_by_signature() {
        let signer = RequestSigner::new("tenancy", "user", "aa:bb", TEST_KEY).unwrap();
        let url = Url::parse("https://auth.ap-mumbai-1.oraclecloud.com/v1/x509").unwrap();
        let body = r#"{"purpose":"DEFAULT"}"#;
        let mut request = reqwest::Client::new()
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .build()
            .unwrap();

        signer.sign(&mut request, fixed_time()).unwrap();

        let headers = request.headers();
        let digest = STANDARD.encode(Sha256::digest(body.as_bytes()));
        assert_eq!(headers["x-content-sha256"], digest.as_str());
        assert_eq!(headers["content-length"], body.len().to_string().as_str());

        let authorization = headers[AUTHORIZATION].to_str().unwrap();
        assert_eq!(
            authorization_param(authorization, "headers"),
            "date (request-target) host content-length content-type x-content-sha256"
        );
        verify(
            authorization,
            &signing_string(&[
                ("date", FIXED_DATE.to_string()),
                (REQUEST_TARGET, request_target("POST", &url)),
                ("host", "auth.ap-mumbai-1.oraclecloud.com".to_string()),
                ("content-length", body.len().to_string()),
                ("content-type", "application/json".to_string()),
                ("x-content-sha256", digest.clone()),
            ]),
        );
    }

    #[tokio::test]
    async fn authorize_signs_with_current_time() {
        let signer = RequestSigner::new("tenancy", "user", "aa:bb", TEST_KEY).unwrap();
        let url = Url::parse(&format!("https://{}/20170907/suppressions", CTRL_HOST)).unwrap();
        let mut request = Request::new(reqwest::Method::GET, url);

        signer.authorize(&mut request).await.unwrap();

        assert!(request.headers().contains_key(AUTHORIZATION));
        assert!(request.headers().contains_key(DATE));
    }
}
