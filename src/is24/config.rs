use thiserror::Error;

pub const DEFAULT_BASE_URL: &str =
    "https://rest.immobilienscout24.de/restapi/api/offer/v1.0/user/me/realestate";

/// Envelope key of the attachment collection endpoint.
pub const ATTACHMENTS_ENVELOPE: &str = "common.attachments";

/// Key holding the attachment collection URL inside a listing's
/// `attachments` reference.
pub const ATTACHMENT_REF_KEY: &str = "@xlink.href";

pub const DEFAULT_LISTING_PATH: [&str; 3] =
    ["realestates.realEstates", "realEstateList", "realEstateElement"];

pub const DEFAULT_ID_KEY: &str = "@id";

/// Prefix shared by every listing type tag the vendor emits.
pub const LISTING_TYPE_PREFIX: &str = "realestates.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing oauth credential `{0}`")]
    MissingCredential(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("invalid config file `{path}`: {reason}")]
    InvalidFile { path: String, reason: String },
}

/// OAuth1.0a consumer and token pair issued by the vendor.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl Credentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }

    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).unwrap_or_default();
        Self {
            consumer_key: read("IS24_CONSUMER_KEY"),
            consumer_secret: read("IS24_CONSUMER_SECRET"),
            token: read("IS24_TOKEN"),
            token_secret: read("IS24_TOKEN_SECRET"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("token", &self.token),
            ("token_secret", &self.token_secret),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingCredential(name));
            }
        }
        Ok(())
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"***")
            .field("token", &self.token)
            .field("token_secret", &"***")
            .finish()
    }
}
