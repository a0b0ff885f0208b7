use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Negotiation, Ride};
use crate::error::Error;

/// Most documents any listing returns.
pub const PAGE_SIZE: usize = 100;

#[async_trait]
pub trait RideAPI {
    async fn create_ride(
        &self,
        rider_name: String,
        rider_phone: String,
        origin: String,
        destination: String,
        initial_price: f64,
    ) -> Result<Ride, Error>;

    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error>;

    /// Rides still taking offers.
    async fn find_available_rides(&self) -> Result<Vec<Ride>, Error>;
}

#[async_trait]
pub trait NegotiationAPI {
    async fn create_negotiation(
        &self,
        ride_id: Uuid,
        driver_id: Option<Uuid>,
        driver_name: String,
        driver_phone: String,
        offer_amount: f64,
        message: Option<String>,
    ) -> Result<Negotiation, Error>;

    async fn counter_negotiation(
        &self,
        negotiation_id: Uuid,
        from_user_name: String,
        from_user_phone: String,
        offer_amount: f64,
        message: Option<String>,
    ) -> Result<Negotiation, Error>;

    async fn find_negotiation(&self, id: Uuid) -> Result<Negotiation, Error>;

    async fn find_negotiations(&self, ride_id: Uuid) -> Result<Vec<Negotiation>, Error>;

    async fn accept_negotiation(&self, ride_id: Uuid, negotiation_id: Uuid)
        -> Result<Ride, Error>;
}

pub trait API: RideAPI + NegotiationAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
