use std::env;
use std::fmt;
use std::time::Duration;

use crate::cli::Cli;
use crate::logging::LogFormat;
use crate::services::email_delivery::endpoint_for_region;
use crate::services::instance_principal::{federation_endpoint_for_region, DEFAULT_METADATA_ENDPOINT};
use crate::suppression::retry::{
    RetryPolicy, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF,
};

pub const DEFAULT_REGION: &str = "ap-mumbai-1";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_API_TITLE: &str = "OCI Business Logic Service";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub tenancy_ocid: String,
    /// Compartment holding the suppression list; the tenancy unless overridden.
    pub compartment_ocid: String,
    pub region: String,
    /// Email Delivery control-plane base URL.
    pub endpoint: String,
    pub auth: AuthConfig,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub host: String,
    pub port: u16,
    pub api_title: String,
    pub api_version: String,
    pub log_format: LogFormat,
}

#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Sign requests with a user API signing key.
    ApiKey {
        user_ocid: String,
        fingerprint: String,
        private_key_pem: String,
    },
    /// Sign requests with a security token obtained from the instance
    /// metadata service and the identity federation endpoint.
    InstancePrincipal {
        metadata_endpoint: String,
        federation_endpoint: String,
    },
    /// Send unsigned requests (local stubs and signing proxies only).
    None,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::ApiKey {
                user_ocid,
                fingerprint,
                ..
            } => f
                .debug_struct("ApiKey")
                .field("user_ocid", user_ocid)
                .field("fingerprint", fingerprint)
                .field("private_key_pem", &"<redacted>")
                .finish(),
            AuthConfig::InstancePrincipal {
                metadata_endpoint,
                federation_endpoint,
            } => f
                .debug_struct("InstancePrincipal")
                .field("metadata_endpoint", metadata_endpoint)
                .field("federation_endpoint", federation_endpoint)
                .finish(),
            AuthConfig::None => f.write_str("None"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tenancy_ocid = get("OCI_TENANCY_OCID").ok_or("OCI_TENANCY_OCID is required")?;
        let compartment_ocid = get("OCI_COMPARTMENT_OCID").unwrap_or_else(|| tenancy_ocid.clone());
        let region = get("OCI_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = get("OCI_EMAIL_ENDPOINT").unwrap_or_else(|| endpoint_for_region(&region));

        let auth = match get("OCI_AUTH_MODE").as_deref().unwrap_or("api_key") {
            "api_key" => {
                let user_ocid = get("OCI_USER_OCID").ok_or("OCI_USER_OCID is required for api_key auth")?;
                let fingerprint =
                    get("OCI_FINGERPRINT").ok_or("OCI_FINGERPRINT is required for api_key auth")?;
                let private_key_pem = match (lookup("OCI_PRIVATE_KEY"), get("OCI_PRIVATE_KEY_PATH")) {
                    (Some(pem), _) if !pem.trim().is_empty() => pem.replace("\\n", "\n"),
                    (_, Some(path)) => std::fs::read_to_string(&path)
                        .map_err(|e| format!("Cannot read OCI_PRIVATE_KEY_PATH {}: {}", path, e))?,
                    _ => return Err("OCI_PRIVATE_KEY or OCI_PRIVATE_KEY_PATH is required for api_key auth".into()),
                };
                AuthConfig::ApiKey {
                    user_ocid,
                    fingerprint,
                    private_key_pem,
                }
            }
            "instance_principal" => AuthConfig::InstancePrincipal {
                metadata_endpoint: get("OCI_METADATA_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_METADATA_ENDPOINT.to_string()),
                federation_endpoint: get("OCI_FEDERATION_ENDPOINT")
                    .unwrap_or_else(|| federation_endpoint_for_region(&region)),
            },
            "none" => AuthConfig::None,
            other => return Err(format!("Invalid OCI_AUTH_MODE: {}", other)),
        };

        let max_attempts = parse_or(&get, "PROVIDER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err("PROVIDER_MAX_ATTEMPTS must be at least 1".into());
        }
        let initial_backoff_ms = parse_or(
            &get,
            "PROVIDER_INITIAL_BACKOFF_MS",
            DEFAULT_INITIAL_BACKOFF.as_millis() as u64,
        )?;
        let max_backoff_ms = parse_or(&get, "PROVIDER_MAX_BACKOFF_MS", DEFAULT_MAX_BACKOFF.as_millis() as u64)?;
        let timeout_secs = parse_or(&get, "PROVIDER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err("PROVIDER_TIMEOUT_SECS must be at least 1".into());
        }
        let request_timeout = Duration::from_secs(timeout_secs);

        let retry = RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
            attempt_timeout: request_timeout,
            jitter: true,
        };

        let host = get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(&get, "PORT", DEFAULT_PORT)?;

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            tenancy_ocid,
            compartment_ocid,
            region,
            endpoint,
            auth,
            retry,
            request_timeout,
            host,
            port,
            api_title: get("API_TITLE").unwrap_or_else(|| DEFAULT_API_TITLE.to_string()),
            api_version: get("API_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_format,
        })
    }

    /// Command-line flags win over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(region) = &cli.region {
            if self.endpoint == endpoint_for_region(&self.region) {
                self.endpoint = endpoint_for_region(region);
            }
            if let AuthConfig::InstancePrincipal {
                federation_endpoint, ..
            } = &mut self.auth
            {
                if *federation_endpoint == federation_endpoint_for_region(&self.region) {
                    *federation_endpoint = federation_endpoint_for_region(region);
                }
            }
            self.region = region.clone();
        }
        if let Some(format) = cli.log_format {
            self.log_format = format;
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
