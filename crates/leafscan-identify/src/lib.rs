//! Plant identification gateway.
//!
//! Turns a photo into plant attributes by asking an external vision model.
//! Whatever the model answers, callers always get all eight attributes back:
//! missing values are filled with neutral defaults and confidence is clamped
//! to 1..=100.

pub mod catalog;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use leafscan_types::NewPlant;

pub use catalog::CatalogIdentifier;
pub use openai::OpenAiIdentifier;

/// User-facing text for every gateway failure.
pub const IDENTIFY_FAILED_MESSAGE: &str = "Failed to identify plant. Please try again.";

const DEFAULT_CONFIDENCE: f64 = 50.0;

#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("identification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("identification service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed identification response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait PlantIdentifier: Send + Sync {
    /// `image_data` is a `data:` URL or an image URL the model can fetch.
    async fn identify(
        &self,
        image_data: &str,
        aroma_level: Option<u8>,
    ) -> Result<Identification, IdentifyError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identification {
    pub scientific_name: String,
    pub common_name: String,
    pub family: String,
    pub origin: String,
    pub light_requirements: String,
    pub watering: String,
    pub special_features: String,
    pub confidence: u8,
}

/// Where and how the photo was taken, supplied by the client.
#[derive(Debug, Clone, Default)]
pub struct Sighting {
    pub image_url: String,
    pub aroma_level: Option<u8>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub location_name: Option<String>,
}

impl Identification {
    /// Normalize a model answer (a JSON object) into a complete identification.
    pub fn from_model_json(value: &Value) -> Self {
        let text = |key: &str, default: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        Self {
            scientific_name: text("scientificName", "Unknown species"),
            common_name: text("commonName", "Unknown plant"),
            family: text("family", "Unknown family"),
            origin: text("origin", "Unknown origin"),
            light_requirements: text("lightRequirements", "Bright, indirect light"),
            watering: text("watering", "Water when soil is dry"),
            special_features: text("specialFeatures", "No special features noted"),
            confidence: clamp_confidence(value.get("confidence")),
        }
    }

    pub fn into_new_plant(self, sighting: Sighting) -> NewPlant {
        NewPlant {
            scientific_name: self.scientific_name,
            common_name: self.common_name,
            family: self.family,
            origin: self.origin,
            light_requirements: self.light_requirements,
            watering: self.watering,
            special_features: self.special_features,
            confidence: self.confidence,
            image_url: sighting.image_url,
            aroma_level: sighting.aroma_level,
            identification_count: Some(1),
            latitude: sighting.latitude,
            longitude: sighting.longitude,
            location_name: sighting.location_name,
        }
    }
}

/// Missing, zero or unparsable confidence counts as 50.
fn clamp_confidence(raw: Option<&Value>) -> u8 {
    let value = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite() && *v != 0.0)
    .unwrap_or(DEFAULT_CONFIDENCE);

    value.round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fills_missing_fields() {
        let id = Identification::from_model_json(&json!({}));
        assert_eq!(id.scientific_name, "Unknown species");
        assert_eq!(id.common_name, "Unknown plant");
        assert_eq!(id.family, "Unknown family");
        assert_eq!(id.origin, "Unknown origin");
        assert_eq!(id.light_requirements, "Bright, indirect light");
        assert_eq!(id.watering, "Water when soil is dry");
        assert_eq!(id.special_features, "No special features noted");
        assert_eq!(id.confidence, 50);
    }

    #[test]
    fn keeps_model_values() {
        let id = Identification::from_model_json(&json!({
            "scientificName": "Quercus robur",
            "commonName": "English Oak",
            "family": "Fagaceae",
            "origin": "Europe",
            "lightRequirements": "Full sun",
            "watering": "Established trees need none",
            "specialFeatures": "Lobed leaves",
            "confidence": 87
        }));
        assert_eq!(id.scientific_name, "Quercus robur");
        assert_eq!(id.common_name, "English Oak");
        assert_eq!(id.confidence, 87);
    }

    #[test]
    fn blank_and_non_string_fields_get_defaults() {
        let id = Identification::from_model_json(&json!({
            "scientificName": "   ",
            "family": 12
        }));
        assert_eq!(id.scientific_name, "Unknown species");
        assert_eq!(id.family, "Unknown family");
    }

    #[test]
    fn confidence_is_clamped() {
        let conf = |v: Value| Identification::from_model_json(&json!({ "confidence": v })).confidence;
        assert_eq!(conf(json!(250)), 100);
        assert_eq!(conf(json!(-3)), 1);
        assert_eq!(conf(json!(0)), 50);
        assert_eq!(conf(json!(0.4)), 1);
        assert_eq!(conf(json!(72.6)), 73);
        assert_eq!(conf(json!("64%")), 64);
        assert_eq!(conf(json!("high")), 50);
        assert_eq!(conf(Value::Null), 50);
    }

    #[test]
    fn carries_sighting_into_insert_payload() {
        let id = Identification::from_model_json(&json!({ "scientificName": "Hedera helix" }));
        let new = id.into_new_plant(Sighting {
            image_url: "data:image/jpeg;base64,AAAA".into(),
            aroma_level: Some(7),
            latitude: Some("53.48".into()),
            longitude: Some("-2.24".into()),
            location_name: None,
        });
        assert_eq!(new.scientific_name, "Hedera helix");
        assert_eq!(new.aroma_level, Some(7));
        assert_eq!(new.identification_count, Some(1));
        assert_eq!(new.latitude.as_deref(), Some("53.48"));
    }
}
