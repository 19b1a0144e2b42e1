use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};

use leafscan_identify::{IDENTIFY_FAILED_MESSAGE, Sighting};
use leafscan_types::api::{IdentifyRequest, MessageResponse};
use leafscan_types::models::{DEFAULT_AROMA_LEVEL, MAX_AROMA_LEVEL};

use crate::AppState;

type ApiError = (StatusCode, Json<MessageResponse>);

fn reject(status: StatusCode, message: &str) -> ApiError {
    (status, Json(MessageResponse::new(message)))
}

fn not_found() -> ApiError {
    reject(StatusCode::NOT_FOUND, "Plant not found")
}

/// Ids that do not parse as a plant id cannot name a plant.
fn parse_id(raw: &str) -> Result<u32, ApiError> {
    raw.parse().map_err(|_| not_found())
}

/// Fractional ratings round to the nearest step.
fn aroma_level(raw: Option<f64>) -> u8 {
    raw.filter(|v| v.is_finite())
        .map_or(f64::from(DEFAULT_AROMA_LEVEL), f64::round)
        .clamp(0.0, f64::from(MAX_AROMA_LEVEL)) as u8
}

/// GET /api/plants
pub async fn list_plants(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.get_all_plants().await)
}

/// GET /api/plants/{id}
pub async fn get_plant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let plant = state.store.get_plant(id).await.ok_or_else(not_found)?;
    Ok(Json(plant))
}

/// POST /api/plants/identify
///
/// Asks the gateway about the photo, then records the answer. A second
/// identification of the same plant bumps the existing record's count.
pub async fn identify_plant(
    State(state): State<AppState>,
    Json(req): Json<IdentifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let image_data = match req.image_data {
        Some(data) if !data.is_empty() => data,
        _ => return Err(reject(StatusCode::BAD_REQUEST, "Image data required")),
    };
    let aroma = aroma_level(req.aroma_level);

    let identification = state
        .identifier
        .identify(&image_data, Some(aroma))
        .await
        .map_err(|e| {
            error!("Plant identification failed: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, IDENTIFY_FAILED_MESSAGE)
        })?;

    let new = identification.into_new_plant(Sighting {
        image_url: image_data,
        aroma_level: Some(aroma),
        latitude: req.latitude,
        longitude: req.longitude,
        location_name: req.location_name,
    });
    let plant = state.store.create_plant(new).await;
    info!(
        "Identified plant {} as {} (seen {} times)",
        plant.id, plant.scientific_name, plant.identification_count
    );

    Ok(Json(plant))
}

/// PATCH /api/plants/{id}/count
pub async fn increment_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let plant = state.store.update_plant_count(id).await.ok_or_else(not_found)?;
    Ok(Json(plant))
}

/// DELETE /api/plants/{id}
pub async fn delete_plant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    if !state.store.delete_plant(id).await {
        return Err(not_found());
    }
    Ok(Json(MessageResponse::new("Plant deleted successfully")))
}

/// DELETE /api/plants
pub async fn delete_all_plants(State(state): State<AppState>) -> impl IntoResponse {
    state.store.delete_all_plants().await;
    Json(MessageResponse::new("All plants deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aroma_defaults_and_clamps() {
        assert_eq!(aroma_level(None), 5);
        assert_eq!(aroma_level(Some(7.0)), 7);
        assert_eq!(aroma_level(Some(5.5)), 6);
        assert_eq!(aroma_level(Some(2.4)), 2);
        assert_eq!(aroma_level(Some(-4.0)), 0);
        assert_eq!(aroma_level(Some(42.0)), 10);
    }

    #[test]
    fn unparsable_ids_are_not_found() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert_eq!(parse_id("abc").unwrap_err().0, StatusCode::NOT_FOUND);
        assert_eq!(parse_id("-1").unwrap_err().0, StatusCode::NOT_FOUND);
    }
}
