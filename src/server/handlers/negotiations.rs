use axum::extract::{rejection::JsonRejection, Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::api::DynAPI;
use crate::entities::Negotiation;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    ride_id: String,
    #[serde(default)]
    driver_id: Option<Uuid>,
    driver_name: String,
    driver_phone: String,
    offer_amount: f64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CounterParams {
    negotiation_id: String,
    from_user_name: String,
    from_user_phone: String,
    offer_amount: f64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CreatedResponse {
    message: String,
    negotiation_id: Uuid,
}

#[derive(Serialize, Deserialize)]
pub struct NegotiationsResponse {
    negotiations: Vec<Negotiation>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    payload: Result<Json<CreateParams>, JsonRejection>,
) -> Result<Json<CreatedResponse>, Error> {
    let Json(params) = payload?;

    let ride_id = parse_id(&params.ride_id, "Ride not found")?;

    let negotiation = api
        .create_negotiation(
            ride_id,
            params.driver_id,
            params.driver_name,
            params.driver_phone,
            params.offer_amount,
            params.message,
        )
        .await?;

    Ok(CreatedResponse {
        message: "Negotiation started".into(),
        negotiation_id: negotiation.id,
    }
    .into())
}

pub async fn counter(
    Extension(api): Extension<DynAPI>,
    payload: Result<Json<CounterParams>, JsonRejection>,
) -> Result<Json<CreatedResponse>, Error> {
    let Json(params) = payload?;

    let negotiation_id = parse_id(&params.negotiation_id, "Original negotiation not found")?;

    let negotiation = api
        .counter_negotiation(
            negotiation_id,
            params.from_user_name,
            params.from_user_phone,
            params.offer_amount,
            params.message,
        )
        .await?;

    Ok(CreatedResponse {
        message: "Counter offer made".into(),
        negotiation_id: negotiation.id,
    }
    .into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    Path(ride_id): Path<String>,
) -> Result<Json<NegotiationsResponse>, Error> {
    // an id that names no ride simply has no negotiations
    let negotiations = match Uuid::parse_str(&ride_id) {
        Ok(ride_id) => api.find_negotiations(ride_id).await?,
        Err(_) => vec![],
    };

    Ok(NegotiationsResponse { negotiations }.into())
}
