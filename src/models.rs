use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::str::FromStr;
use thiserror::Error;

/// A resolved listing attachment. `url` stays empty for records that carry
/// no usable address, e.g. a picture without the requested scale.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Vendor image resizing strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleMode {
    #[default]
    ScaleAndCrop,
    Scale,
    WhiteFilling,
}

impl ScaleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleMode::ScaleAndCrop => "SCALE_AND_CROP",
            ScaleMode::Scale => "SCALE",
            ScaleMode::WhiteFilling => "WHITE_FILLING",
        }
    }

}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scale mode `{0}`")]
pub struct UnknownScaleMode(pub String);

impl FromStr for ScaleMode {
    type Err = UnknownScaleMode;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "SCALE_AND_CROP" => Ok(ScaleMode::ScaleAndCrop),
            "SCALE" => Ok(ScaleMode::Scale),
            "WHITE_FILLING" => Ok(ScaleMode::WhiteFilling),
            _ => Err(UnknownScaleMode(input.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub owner: String,
    pub stages: Vec<StageReport>,
    pub published: Vec<String>,
    pub deleted: Vec<String>,
}
