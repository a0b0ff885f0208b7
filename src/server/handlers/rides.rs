use axum::extract::{rejection::JsonRejection, Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::api::DynAPI;
use crate::entities::Ride;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    rider_name: String,
    rider_phone: String,
    origin: String,
    destination: String,
    initial_price: f64,
}

#[derive(Serialize, Deserialize)]
pub struct CreateResponse {
    message: String,
    ride_id: Uuid,
    ride: Ride,
}

#[derive(Serialize, Deserialize)]
pub struct RideResponse {
    ride: Ride,
}

#[derive(Serialize, Deserialize)]
pub struct RidesResponse {
    rides: Vec<Ride>,
}

#[derive(Serialize, Deserialize)]
pub struct AcceptResponse {
    message: String,
    final_price: f64,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    payload: Result<Json<CreateParams>, JsonRejection>,
) -> Result<Json<CreateResponse>, Error> {
    let Json(params) = payload?;

    let ride = api
        .create_ride(
            params.rider_name,
            params.rider_phone,
            params.origin,
            params.destination,
            params.initial_price,
        )
        .await?;

    Ok(CreateResponse {
        message: "Ride request created".into(),
        ride_id: ride.id,
        ride,
    }
    .into())
}

pub async fn list(Extension(api): Extension<DynAPI>) -> Result<Json<RidesResponse>, Error> {
    let rides = api.find_available_rides().await?;

    Ok(RidesResponse { rides }.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    Path(id): Path<String>,
) -> Result<Json<RideResponse>, Error> {
    let id = parse_id(&id, "Ride not found")?;
    let ride = api.find_ride(id).await?;

    Ok(RideResponse { ride }.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    Path((ride_id, negotiation_id)): Path<(String, String)>,
) -> Result<Json<AcceptResponse>, Error> {
    let negotiation_id = parse_id(&negotiation_id, "Negotiation not found")?;
    let ride_id = parse_id(&ride_id, "Ride not found")?;

    let ride = api.accept_negotiation(ride_id, negotiation_id).await?;

    Ok(AcceptResponse {
        message: "Ride agreement confirmed!".into(),
        final_price: ride.current_price,
    }
    .into())
}
