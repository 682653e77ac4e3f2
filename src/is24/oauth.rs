use crate::is24::config::{ConfigError, Credentials};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use reqwest::Url;
use sha1::Sha1;
use std::sync::Arc;
use urlencoding::encode;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Source of the two non-deterministic inputs of a signature.
pub trait NonceSource: Send + Sync {
    fn nonce(&self) -> String;
    fn timestamp(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNonce;

impl NonceSource for SystemNonce {
    fn nonce(&self) -> String {
        rand::rng()
            .sample_iter(Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect()
    }

    fn timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone)]
pub struct FixedNonce {
    pub nonce: String,
    pub timestamp: i64,
}

impl NonceSource for FixedNonce {
    fn nonce(&self) -> String {
        self.nonce.clone()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub url: String,
    pub method: String,
    pub header: String,
}

#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    nonces: Arc<dyn NonceSource>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_nonce_source(credentials, Arc::new(SystemNonce))
    }

    pub fn with_nonce_source(credentials: Credentials, nonces: Arc<dyn NonceSource>) -> Self {
        Self {
            credentials,
            nonces,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn sign(&self, method: &str, url: &str) -> Result<SignedRequest, ConfigError> {
        self.sign_form(method, url, &[])
    }

    /// Signs a request whose form-encoded body parameters take part in the
    /// signature base string.
    pub fn sign_form(
        &self,
        method: &str,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<SignedRequest, ConfigError> {
        self.credentials.validate()?;
        let nonce = self.nonces.nonce();
        let timestamp = self.nonces.timestamp().to_string();

        let oauth_params = [
            ("oauth_consumer_key", self.credentials.consumer_key.as_str()),
            ("oauth_nonce", nonce.as_str()),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.credentials.token.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ];

        let parsed = Url::parse(url).map_err(|err| ConfigError::InvalidValue {
            key: "url".into(),
            reason: format!("{url}: {err}"),
        })?;
        let mut params: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.extend(form.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        params.extend(
            oauth_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let base = signature_base_string(method, &base_url(&parsed), &params);
        let signature = hmac_sha1_base64(&self.signing_key(), &base)?;

        let header = format!(
            "OAuth oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature_method=\"{}\", oauth_timestamp=\"{}\", oauth_nonce=\"{}\", oauth_version=\"{}\", oauth_signature=\"{}\"",
            encode(&self.credentials.consumer_key),
            encode(&self.credentials.token),
            SIGNATURE_METHOD,
            encode(&timestamp),
            encode(&nonce),
            OAUTH_VERSION,
            encode(&signature),
        );

        Ok(SignedRequest {
            url: url.to_string(),
            method: method.to_uppercase(),
            header,
        })
    }

    fn signing_key(&self) -> String {
        format!(
            "{}&{}",
            encode(&self.credentials.consumer_secret),
            encode(&self.credentials.token_secret)
        )
    }
}

/// Scheme and authority lowercased, default ports dropped, no query or fragment.
pub fn base_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!(
        "{}://{}{}{}",
        url.scheme().to_lowercase(),
        host,
        port,
        url.path()
    )
}

pub fn signature_base_string(method: &str, base_url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned()))
        .collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(base_url),
        encode(&normalized)
    )
}

fn hmac_sha1_base64(key: &str, message: &str) -> Result<String, ConfigError> {
    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).map_err(|err| ConfigError::InvalidValue {
            key: "signing_key".into(),
            reason: err.to_string(),
        })?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
