use serde::{Deserialize, Serialize};

// -- Plants --

/// Body of `POST /api/plants/identify`.
///
/// `image_data` is optional at the type level so a missing image is answered
/// with 400 by the handler instead of a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub image_data: Option<String>,
    pub aroma_level: Option<f64>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub location_name: Option<String>,
}

// -- Generic --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
