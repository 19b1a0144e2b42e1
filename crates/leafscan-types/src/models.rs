use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AROMA_LEVEL: u8 = 5;
pub const MAX_AROMA_LEVEL: u8 = 10;

/// A persisted plant identification.
///
/// Only `identification_count` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: u32,
    pub scientific_name: String,
    pub common_name: String,
    pub family: String,
    pub origin: String,
    pub light_requirements: String,
    pub watering: String,
    pub special_features: String,
    pub confidence: u8,
    pub image_url: String,
    pub aroma_level: u8,
    pub identification_count: u32,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Plant {
    /// Whether `new` names the same species as this record.
    pub fn matches(&self, new: &NewPlant) -> bool {
        self.scientific_name == new.scientific_name && self.common_name == new.common_name
    }
}

/// Insert payload for a plant. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlant {
    pub scientific_name: String,
    pub common_name: String,
    pub family: String,
    pub origin: String,
    pub light_requirements: String,
    pub watering: String,
    pub special_features: String,
    pub confidence: u8,
    pub image_url: String,
    #[serde(default)]
    pub aroma_level: Option<u8>,
    #[serde(default)]
    pub identification_count: Option<u32>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
}

impl NewPlant {
    /// Build the stored record, applying defaults.
    ///
    /// `image_url` is the representation the backend decided to persist,
    /// which may differ from `self.image_url`.
    pub fn into_plant(self, id: u32, image_url: String, created_at: DateTime<Utc>) -> Plant {
        let (latitude, longitude) = match (non_empty(self.latitude), non_empty(self.longitude)) {
            (Some(lat), Some(lng)) => (Some(lat), Some(lng)),
            _ => (None, None),
        };

        Plant {
            id,
            scientific_name: self.scientific_name,
            common_name: self.common_name,
            family: self.family,
            origin: self.origin,
            light_requirements: self.light_requirements,
            watering: self.watering,
            special_features: self.special_features,
            confidence: self.confidence,
            image_url,
            aroma_level: self
                .aroma_level
                .unwrap_or(DEFAULT_AROMA_LEVEL)
                .min(MAX_AROMA_LEVEL),
            identification_count: self.identification_count.unwrap_or(1).max(1),
            latitude,
            longitude,
            location_name: non_empty(self.location_name),
            created_at,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Placeholder account record. No flow authenticates against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

impl NewUser {
    pub fn into_user(self, id: u32) -> User {
        User {
            id,
            username: self.username,
            password: self.password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monstera() -> NewPlant {
        NewPlant {
            scientific_name: "Monstera deliciosa".into(),
            common_name: "Swiss Cheese Plant".into(),
            family: "Araceae".into(),
            origin: "Central America".into(),
            light_requirements: "Bright, indirect light".into(),
            watering: "Weekly".into(),
            special_features: "Fenestrated leaves".into(),
            confidence: 92,
            image_url: "data:image/jpeg;base64,AAAA".into(),
            aroma_level: None,
            identification_count: None,
            latitude: None,
            longitude: None,
            location_name: None,
        }
    }

    #[test]
    fn defaults_applied_on_build() {
        let plant = monstera().into_plant(1, "x".into(), Utc::now());
        assert_eq!(plant.aroma_level, DEFAULT_AROMA_LEVEL);
        assert_eq!(plant.identification_count, 1);
        assert_eq!(plant.latitude, None);
        assert_eq!(plant.location_name, None);
        assert_eq!(plant.image_url, "x");
    }

    #[test]
    fn half_coordinates_are_dropped() {
        let mut new = monstera();
        new.latitude = Some("51.5".into());
        new.location_name = Some(String::new());
        let plant = new.into_plant(1, String::new(), Utc::now());
        assert_eq!(plant.latitude, None);
        assert_eq!(plant.longitude, None);
        assert_eq!(plant.location_name, None);

        let mut new = monstera();
        new.latitude = Some("51.5".into());
        new.longitude = Some("-0.12".into());
        let plant = new.into_plant(1, String::new(), Utc::now());
        assert_eq!(plant.latitude.as_deref(), Some("51.5"));
        assert_eq!(plant.longitude.as_deref(), Some("-0.12"));
    }

    #[test]
    fn aroma_level_is_clamped() {
        let mut new = monstera();
        new.aroma_level = Some(42);
        let plant = new.into_plant(3, String::new(), Utc::now());
        assert_eq!(plant.aroma_level, MAX_AROMA_LEVEL);
    }

    #[test]
    fn match_requires_both_names() {
        let plant = monstera().into_plant(1, String::new(), Utc::now());
        assert!(plant.matches(&monstera()));

        let mut other = monstera();
        other.common_name = "Split-leaf Philodendron".into();
        assert!(!plant.matches(&other));
    }

    #[test]
    fn plant_serializes_camel_case() {
        let plant = monstera().into_plant(7, "/data/images/plant-7.jpg".into(), Utc::now());
        let json = serde_json::to_value(&plant).unwrap();
        assert_eq!(json["scientificName"], "Monstera deliciosa");
        assert_eq!(json["identificationCount"], 1);
        assert_eq!(json["imageUrl"], "/data/images/plant-7.jpg");
        assert!(json["latitude"].is_null());
        assert!(json.get("createdAt").is_some());
    }
}
