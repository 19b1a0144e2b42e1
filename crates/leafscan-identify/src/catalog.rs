use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::{Identification, IdentifyError, PlantIdentifier};

struct Entry {
    scientific_name: &'static str,
    common_name: &'static str,
    family: &'static str,
    origin: &'static str,
    light_requirements: &'static str,
    watering: &'static str,
    special_features: &'static str,
    confidence: u8,
}

const HOUSEPLANTS: [Entry; 5] = [
    Entry {
        scientific_name: "Monstera deliciosa",
        common_name: "Swiss Cheese Plant",
        family: "Araceae",
        origin: "Central America, Southern Mexico",
        light_requirements: "Bright, indirect light",
        watering: "Water when top inch of soil is dry. Approximately once per week.",
        special_features: "Known for its distinctive split leaves (fenestration) that develop as the plant matures. Can grow very large indoors with proper support.",
        confidence: 92,
    },
    Entry {
        scientific_name: "Sansevieria trifasciata",
        common_name: "Snake Plant",
        family: "Asparagaceae",
        origin: "West Africa",
        light_requirements: "Low to bright, indirect light",
        watering: "Water every 2-3 weeks. Allow soil to dry completely between waterings.",
        special_features: "Extremely drought tolerant and air purifying. Can survive in low light conditions.",
        confidence: 89,
    },
    Entry {
        scientific_name: "Ficus lyrata",
        common_name: "Fiddle Leaf Fig",
        family: "Moraceae",
        origin: "Western Africa",
        light_requirements: "Bright, indirect light",
        watering: "Water when top 1-2 inches of soil are dry.",
        special_features: "Large, violin-shaped leaves. Requires consistent care and doesn't like to be moved.",
        confidence: 85,
    },
    Entry {
        scientific_name: "Epipremnum aureum",
        common_name: "Golden Pothos",
        family: "Araceae",
        origin: "Solomon Islands",
        light_requirements: "Low to bright, indirect light",
        watering: "Water when soil feels dry. Approximately every 1-2 weeks.",
        special_features: "Trailing vine that can be grown as a hanging plant or trained up a support. Very forgiving and fast-growing.",
        confidence: 91,
    },
    Entry {
        scientific_name: "Ficus elastica",
        common_name: "Rubber Plant",
        family: "Moraceae",
        origin: "India and Southeast Asia",
        light_requirements: "Bright, indirect light",
        watering: "Water when top inch of soil is dry.",
        special_features: "Glossy, thick leaves that start burgundy and mature to deep green. Can grow into a large tree indoors.",
        confidence: 88,
    },
];

impl Entry {
    fn to_identification(&self) -> Identification {
        Identification {
            scientific_name: self.scientific_name.to_string(),
            common_name: self.common_name.to_string(),
            family: self.family.to_string(),
            origin: self.origin.to_string(),
            light_requirements: self.light_requirements.to_string(),
            watering: self.watering.to_string(),
            special_features: self.special_features.to_string(),
            confidence: self.confidence,
        }
    }
}

/// Offline identifier that answers with a random common houseplant.
///
/// Used when no model API key is configured, so the rest of the app can be
/// exercised without network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogIdentifier;

impl CatalogIdentifier {
    pub fn new() -> Self {
        Self
    }

    pub fn len(&self) -> usize {
        HOUSEPLANTS.len()
    }

    pub fn is_empty(&self) -> bool {
        HOUSEPLANTS.is_empty()
    }

    /// Entry `index` modulo the catalog size.
    pub fn pick(&self, index: usize) -> Identification {
        HOUSEPLANTS[index % HOUSEPLANTS.len()].to_identification()
    }
}

#[async_trait]
impl PlantIdentifier for CatalogIdentifier {
    async fn identify(
        &self,
        _image_data: &str,
        aroma_level: Option<u8>,
    ) -> Result<Identification, IdentifyError> {
        let index = rand::rng().random_range(0..HOUSEPLANTS.len());
        let identification = self.pick(index);
        debug!(
            "Catalog picked {} (aroma {:?})",
            identification.scientific_name, aroma_level
        );
        Ok(identification)
    }
}
