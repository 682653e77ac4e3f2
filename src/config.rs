use crate::estate::rename::RenameRules;
use crate::http::HttpSettings;
use crate::is24::config::{
    ConfigError, Credentials, DEFAULT_BASE_URL, DEFAULT_ID_KEY, DEFAULT_LISTING_PATH,
    LISTING_TYPE_PREFIX,
};
use crate::models::{ImageSize, ScaleMode, UnknownScaleMode};
use serde::Deserialize;
use std::{collections::BTreeMap, env, path::Path};
use tracing::info;
use urlencoding::encode;

pub const DEFAULT_OWNER: &str = "is24-source";
pub const DEFAULT_NODE_TYPE: &str = "is24Estates";

/// Everything one sync pass needs. Built once by the host and handed to
/// [`crate::pipeline::Pipeline::new`]; nothing downstream reads the
/// environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub credentials: Credentials,
    pub base_url: String,
    pub owner: String,
    pub node_type: String,
    pub rename: RenameRules,
    pub image_size: ImageSize,
    pub scale_mode: ScaleMode,
    pub listing_path: Vec<String>,
    pub id_key: String,
    pub type_prefix: String,
    pub max_concurrency: Option<usize>,
    pub include_overview: bool,
    /// Listing fields copied verbatim into the overview.
    pub overview_fields: Vec<String>,
    pub http: HttpSettings,
}

impl PipelineConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            node_type: DEFAULT_NODE_TYPE.to_string(),
            rename: RenameRules::default(),
            image_size: ImageSize::default(),
            scale_mode: ScaleMode::Scale,
            listing_path: DEFAULT_LISTING_PATH.iter().map(|s| s.to_string()).collect(),
            id_key: DEFAULT_ID_KEY.to_string(),
            type_prefix: LISTING_TYPE_PREFIX.to_string(),
            max_concurrency: None,
            include_overview: true,
            overview_fields: Vec::new(),
            http: HttpSettings::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(Credentials::from_env());
        config.http = HttpSettings::from_env();

        if let Some(path) = env_string("IS24_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        if let Some(url) = env_string("IS24_BASE_URL") {
            config.base_url = url;
        }
        if let Some(owner) = env_string("IS24_OWNER") {
            config.owner = owner;
        }
        if let Some(width) = env_parse::<u32>("IS24_IMAGE_WIDTH")? {
            config.image_size.width = width;
        }
        if let Some(height) = env_parse::<u32>("IS24_IMAGE_HEIGHT")? {
            config.image_size.height = height;
        }
        if let Some(raw) = env_string("IS24_SCALE_MODE") {
            config.scale_mode = raw.parse().map_err(|err: UnknownScaleMode| {
                ConfigError::InvalidValue {
                    key: "IS24_SCALE_MODE".into(),
                    reason: err.to_string(),
                }
            })?;
        }
        if let Some(limit) = env_parse::<usize>("IS24_MAX_CONCURRENCY")? {
            config.max_concurrency = Some(limit);
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlays settings from a YAML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::InvalidFile {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let overlay: ConfigOverlay =
            serde_yaml::from_str(&raw).map_err(|err| ConfigError::InvalidFile {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
        self.apply_overlay(overlay);
        info!(
            target: "is24.config",
            path = %path.display(),
            aliases = self.rename.aliases().len(),
            "loaded config overlay"
        );
        Ok(())
    }

    pub fn apply_yaml(&mut self, raw: &str) -> Result<(), ConfigError> {
        let overlay: ConfigOverlay =
            serde_yaml::from_str(raw).map_err(|err| ConfigError::InvalidFile {
                path: "<inline>".into(),
                reason: err.to_string(),
            })?;
        self.apply_overlay(overlay);
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if overlay.key_aliases.is_some() || overlay.strip_substring.is_some() {
            let aliases = overlay
                .key_aliases
                .unwrap_or_else(|| self.rename.aliases().clone());
            let strip = match overlay.strip_substring {
                Some(strip) => Some(strip),
                None => self.rename.strip().map(str::to_string),
            };
            self.rename = RenameRules::new(aliases, strip);
        }
        if let Some(url) = overlay.base_url {
            self.base_url = url;
        }
        if let Some(owner) = overlay.owner {
            self.owner = owner;
        }
        if let Some(size) = overlay.image_size {
            self.image_size = size;
        }
        if let Some(mode) = overlay.scale_mode {
            self.scale_mode = mode;
        }
        if let Some(path) = overlay.listing_path {
            self.listing_path = path;
        }
        if let Some(limit) = overlay.max_concurrency {
            self.max_concurrency = Some(limit);
        }
        if let Some(flag) = overlay.include_overview {
            self.include_overview = flag;
        }
        if let Some(fields) = overlay.overview_fields {
            self.overview_fields = fields;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials.validate()?;
        reqwest::Url::parse(&self.base_url).map_err(|err| ConfigError::InvalidValue {
            key: "base_url".into(),
            reason: err.to_string(),
        })?;
        if self.owner.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "owner".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.listing_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "listing_path".into(),
                reason: "must name at least one key".into(),
            });
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrency".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Detail endpoint of one listing. The id is a single path segment.
    pub fn listing_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), encode(id))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    #[serde(default)]
    key_aliases: Option<BTreeMap<String, String>>,
    #[serde(default)]
    strip_substring: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    image_size: Option<ImageSize>,
    #[serde(default)]
    scale_mode: Option<ScaleMode>,
    #[serde(default)]
    listing_path: Option<Vec<String>>,
    #[serde(default)]
    max_concurrency: Option<usize>,
    #[serde(default)]
    include_overview: Option<bool>,
    #[serde(default)]
    overview_fields: Option<Vec<String>>,
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: err.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::new(Credentials::new("ck", "cs", "tk", "ts"))
    }

    #[test]
    fn defaults_match_vendor_conventions() {
        let cfg = config();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.rename.strip(), Some("@"));
        assert_eq!(cfg.scale_mode, ScaleMode::Scale);
        assert_eq!(cfg.listing_path.len(), 3);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.listing_url("42"), format!("{DEFAULT_BASE_URL}/42"));
    }

    #[test]
    fn yaml_overlay_replaces_selected_fields() {
        let mut cfg = config();
        cfg.apply_yaml(
            r#"
key_aliases:
  "@xsi.type": kind
strip_substring: ""
image_size: { width: 1024, height: 768 }
scale_mode: WHITE_FILLING
max_concurrency: 4
overview_fields: [livingSpace, balcony]
"#,
        )
        .expect("overlay");
        assert_eq!(cfg.rename.rename("@xsi.type"), "kind");
        assert_eq!(cfg.rename.rename("@id"), "@id");
        assert_eq!(
            cfg.image_size,
            ImageSize {
                width: 1024,
                height: 768
            }
        );
        assert_eq!(cfg.scale_mode, ScaleMode::WhiteFilling);
        assert_eq!(cfg.max_concurrency, Some(4));
        assert_eq!(cfg.overview_fields, vec!["livingSpace", "balcony"]);
        assert_eq!(cfg.owner, DEFAULT_OWNER);
    }

    #[test]
    fn malformed_rename_config_is_a_configuration_error() {
        let mut cfg = config();
        let err = cfg
            .apply_yaml("key_aliases: [not, a, mapping]")
            .expect_err("bad aliases");
        assert!(matches!(err, ConfigError::InvalidFile { .. }));
        let err = cfg
            .apply_yaml("strip_substring: { nested: true }")
            .expect_err("bad strip");
        assert!(matches!(err, ConfigError::InvalidFile { .. }));
        assert!(cfg.apply_yaml("unknown_key: 1").is_err());
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let mut cfg = config();
        cfg.max_concurrency = Some(0);
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.base_url = "::nope".into();
        assert!(cfg.validate().is_err());

        let cfg = PipelineConfig::new(Credentials::default());
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingCredential("consumer_key"))
        );
    }

    #[test]
    fn listing_ids_are_encoded_as_one_path_segment() {
        let mut cfg = config();
        cfg.base_url = "http://vendor.test/realestate/".into();
        assert_eq!(cfg.listing_url("101"), "http://vendor.test/realestate/101");
        assert_eq!(
            cfg.listing_url("a b/../c?x"),
            "http://vendor.test/realestate/a%20b%2F..%2Fc%3Fx"
        );
    }

    #[test]
    fn overlay_file_errors_name_the_path() {
        let mut cfg = config();
        let err = cfg
            .apply_file(Path::new("/nonexistent/is24.yaml"))
            .expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/is24.yaml"));
    }
}
