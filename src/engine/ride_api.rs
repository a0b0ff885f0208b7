use super::{require_price, require_text, Engine};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    api::{RideAPI, PAGE_SIZE},
    entities::{Ride, RideStatus},
    error::Error,
};

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self, rider_phone))]
    async fn create_ride(
        &self,
        rider_name: String,
        rider_phone: String,
        origin: String,
        destination: String,
        initial_price: f64,
    ) -> Result<Ride, Error> {
        require_text("rider_name", &rider_name)?;
        require_text("rider_phone", &rider_phone)?;
        require_text("origin", &origin)?;
        require_text("destination", &destination)?;
        require_price("initial_price", initial_price)?;

        let ride = Ride::new(rider_name, rider_phone, origin, destination, initial_price);

        self.store.insert_ride(&ride).await?;

        tracing::info!(ride_id = %ride.id, "ride request created");

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Ride, Error> {
        self.store
            .find_ride(id)
            .await?
            .ok_or_else(|| Error::not_found_error("Ride not found"))
    }

    #[tracing::instrument(skip(self))]
    async fn find_available_rides(&self) -> Result<Vec<Ride>, Error> {
        self.store
            .find_rides_by_status(RideStatus::negotiable(), PAGE_SIZE)
            .await
    }
}

#[cfg(test)]
fn engine() -> Engine {
    use crate::db::MemoryStore;
    use std::sync::Arc;

    Engine::new(Arc::new(MemoryStore::new()))
}

#[test]
fn create_ride_opens_at_initial_price() {
    use tokio_test::block_on;

    let engine = engine();

    let ride = block_on(engine.create_ride(
        "John Doe".into(),
        "555-1234".into(),
        "Downtown Mall".into(),
        "Airport".into(),
        25.0,
    ))
    .unwrap();

    assert_eq!(ride.status, RideStatus::Open);
    assert_eq!(ride.current_price, 25.0);

    let found = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(found, ride);
}

#[test]
fn create_ride_validates_input() {
    use tokio_test::block_on;

    let engine = engine();

    let err = block_on(engine.create_ride(
        "".into(),
        "555-1234".into(),
        "Downtown Mall".into(),
        "Airport".into(),
        25.0,
    ))
    .unwrap_err();
    assert!(err.is_invalid_input_error());

    let err = block_on(engine.create_ride(
        "John Doe".into(),
        "555-1234".into(),
        "Downtown Mall".into(),
        "Airport".into(),
        -1.0,
    ))
    .unwrap_err();
    assert!(err.is_invalid_input_error());

    assert!(block_on(engine.find_available_rides()).unwrap().is_empty());
}

#[test]
fn find_unknown_ride() {
    use tokio_test::block_on;

    let engine = engine();
    let err = block_on(engine.find_ride(Uuid::new_v4())).unwrap_err();

    assert!(err.is_not_found_error());
}

#[test]
fn available_rides_capped_at_page_size() {
    use tokio_test::block_on;

    let engine = engine();

    for i in 0..(PAGE_SIZE + 5) {
        block_on(engine.create_ride(
            format!("rider {}", i),
            "555".into(),
            "a".into(),
            "b".into(),
            10.0,
        ))
        .unwrap();
    }

    let rides = block_on(engine.find_available_rides()).unwrap();
    assert_eq!(rides.len(), PAGE_SIZE);
    assert_eq!(rides[0].rider_name, "rider 0");
}
