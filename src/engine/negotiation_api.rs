use super::{require_price, require_text, Engine};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::{NegotiationAPI, RideAPI, PAGE_SIZE},
    db::Effect,
    entities::{Negotiation, Ride},
    error::Error,
};

#[async_trait]
impl NegotiationAPI for Engine {
    #[tracing::instrument(skip(self, driver_phone, message))]
    async fn create_negotiation(
        &self,
        ride_id: Uuid,
        driver_id: Option<Uuid>,
        driver_name: String,
        driver_phone: String,
        offer_amount: f64,
        message: Option<String>,
    ) -> Result<Negotiation, Error> {
        require_text("driver_name", &driver_name)?;
        require_text("driver_phone", &driver_phone)?;
        require_price("offer_amount", offer_amount)?;

        // the rider never changes, so the offer can be addressed before the
        // ride is locked
        let ride = self.find_ride(ride_id).await?;
        let negotiation = Negotiation::offer(
            &ride,
            driver_id,
            driver_name,
            driver_phone,
            offer_amount,
            message,
        );

        let negotiation_id = negotiation.id;
        self.store
            .apply_transition(
                ride_id,
                Box::new(move |ride: &mut Ride| -> Result<Vec<Effect>, Error> {
                    ride.receive_offer(offer_amount)?;
                    Ok(vec![stamped(negotiation)])
                }),
            )
            .await?;

        tracing::info!(%negotiation_id, "negotiation started");

        self.find_negotiation(negotiation_id).await
    }

    #[tracing::instrument(skip(self, from_user_phone, message))]
    async fn counter_negotiation(
        &self,
        negotiation_id: Uuid,
        from_user_name: String,
        from_user_phone: String,
        offer_amount: f64,
        message: Option<String>,
    ) -> Result<Negotiation, Error> {
        require_text("from_user_name", &from_user_name)?;
        require_text("from_user_phone", &from_user_phone)?;
        require_price("offer_amount", offer_amount)?;

        let prior = self
            .find_negotiation(negotiation_id)
            .await
            .map_err(|err| {
                if err.is_not_found_error() {
                    Error::not_found_error("Original negotiation not found")
                } else {
                    err
                }
            })?;

        let counter = prior.counter(from_user_name, from_user_phone, offer_amount, message);

        let counter_id = counter.id;
        self.store
            .apply_transition(
                prior.ride_id,
                Box::new(move |ride: &mut Ride| -> Result<Vec<Effect>, Error> {
                    ride.receive_counter(offer_amount)?;
                    Ok(vec![stamped(counter)])
                }),
            )
            .await?;

        tracing::info!(negotiation_id = %counter_id, "counter offer made");

        self.find_negotiation(counter_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_negotiation(&self, id: Uuid) -> Result<Negotiation, Error> {
        self.store
            .find_negotiation(id)
            .await?
            .ok_or_else(|| Error::not_found_error("Negotiation not found"))
    }

    #[tracing::instrument(skip(self))]
    async fn find_negotiations(&self, ride_id: Uuid) -> Result<Vec<Negotiation>, Error> {
        self.store
            .find_negotiations_by_ride(ride_id, PAGE_SIZE)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn accept_negotiation(
        &self,
        ride_id: Uuid,
        negotiation_id: Uuid,
    ) -> Result<Ride, Error> {
        let offer = self.find_negotiation(negotiation_id).await?;

        let ride = self
            .store
            .apply_transition(
                ride_id,
                Box::new(move |ride: &mut Ride| -> Result<Vec<Effect>, Error> {
                    ride.accept(&offer)?;
                    Ok(vec![Effect::AcceptNegotiation(offer.id)])
                }),
            )
            .await?;

        tracing::info!(final_price = ride.current_price, "ride agreement confirmed");

        Ok(ride)
    }
}

/// Stamps the offer while its ride is locked, keeping timestamp order equal
/// to the order offers moved the price.
fn stamped(mut negotiation: Negotiation) -> Effect {
    negotiation.timestamp = Utc::now();
    Effect::InsertNegotiation(negotiation)
}

#[cfg(test)]
fn setup() -> (Engine, Ride) {
    use crate::db::MemoryStore;
    use std::sync::Arc;
    use tokio_test::block_on;

    let engine = Engine::new(Arc::new(MemoryStore::new()));
    let ride = block_on(engine.create_ride(
        "John Doe".into(),
        "555-1234".into(),
        "Downtown Mall".into(),
        "Airport".into(),
        25.0,
    ))
    .unwrap();

    (engine, ride)
}

#[test]
fn full_negotiation() {
    use crate::entities::RideStatus;
    use tokio_test::block_on;

    let (engine, ride) = setup();

    let offer = block_on(engine.create_negotiation(
        ride.id,
        None,
        "Alice Smith".into(),
        "555-5678".into(),
        30.0,
        Some("I can do this ride safely".into()),
    ))
    .unwrap();

    let after_offer = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(after_offer.status, RideStatus::Negotiating);
    assert_eq!(after_offer.current_price, 30.0);
    assert_eq!(offer.to_user_id, ride.rider_id);
    assert_eq!(offer.message, "I can do this ride safely");

    let counter = block_on(engine.counter_negotiation(
        offer.id,
        "John Doe".into(),
        "555-1234".into(),
        27.0,
        None,
    ))
    .unwrap();

    let after_counter = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(after_counter.status, RideStatus::Negotiating);
    assert_eq!(after_counter.current_price, 27.0);
    assert_eq!(counter.from_user_id, ride.rider_id);
    assert_eq!(counter.to_user_id, offer.from_user_id);
    assert_eq!(counter.parent_negotiation_id, Some(offer.id));

    let agreed = block_on(engine.accept_negotiation(ride.id, counter.id)).unwrap();
    assert_eq!(agreed.status, RideStatus::Agreed);
    assert_eq!(agreed.current_price, 27.0);
    // the sender of the accepted counter is the rider
    assert_eq!(agreed.agreed_driver_id, Some(ride.rider_id));
    assert_eq!(agreed.agreed_driver_name.as_deref(), Some("John Doe"));

    let negotiations = block_on(engine.find_negotiations(ride.id)).unwrap();
    assert_eq!(negotiations.len(), 2);
    assert!(!negotiations[0].is_accepted);
    assert!(negotiations[1].is_accepted);

    assert!(block_on(engine.find_available_rides()).unwrap().is_empty());
}

#[test]
fn current_price_tracks_latest_offer() {
    use tokio_test::block_on;

    let (engine, ride) = setup();

    let mut last = block_on(engine.create_negotiation(
        ride.id,
        None,
        "Alice".into(),
        "1".into(),
        40.0,
        None,
    ))
    .unwrap();

    for amount in [35.0, 38.0, 36.5, 37.0] {
        last = block_on(engine.counter_negotiation(
            last.id,
            "someone".into(),
            "2".into(),
            amount,
            None,
        ))
        .unwrap();

        let ride = block_on(engine.find_ride(ride.id)).unwrap();
        assert_eq!(ride.current_price, amount);
    }

    block_on(engine.create_negotiation(ride.id, None, "Bob".into(), "3".into(), 33.0, None))
        .unwrap();
    assert_eq!(block_on(engine.find_ride(ride.id)).unwrap().current_price, 33.0);

    let negotiations = block_on(engine.find_negotiations(ride.id)).unwrap();
    assert_eq!(negotiations.len(), 6);
    assert!(negotiations
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[test]
fn offers_rejected_once_agreed() {
    use tokio_test::block_on;

    let (engine, ride) = setup();

    let offer = block_on(engine.create_negotiation(
        ride.id,
        None,
        "Alice".into(),
        "1".into(),
        30.0,
        None,
    ))
    .unwrap();
    block_on(engine.accept_negotiation(ride.id, offer.id)).unwrap();

    let err = block_on(engine.create_negotiation(
        ride.id,
        None,
        "Bob".into(),
        "2".into(),
        20.0,
        None,
    ))
    .unwrap_err();
    assert!(err.is_invalid_state_error());

    let err = block_on(engine.counter_negotiation(
        offer.id,
        "John Doe".into(),
        "555-1234".into(),
        28.0,
        None,
    ))
    .unwrap_err();
    assert!(err.is_invalid_state_error());

    let err = block_on(engine.accept_negotiation(ride.id, offer.id)).unwrap_err();
    assert!(err.is_invalid_state_error());

    let ride = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(ride.current_price, 30.0);
    assert_eq!(block_on(engine.find_negotiations(ride.id)).unwrap().len(), 1);
}

#[test]
fn unknown_ids_are_not_found() {
    use tokio_test::block_on;

    let (engine, ride) = setup();

    let err = block_on(engine.create_negotiation(
        Uuid::new_v4(),
        None,
        "Alice".into(),
        "1".into(),
        30.0,
        None,
    ))
    .unwrap_err();
    assert!(err.is_not_found_error());

    let err = block_on(engine.counter_negotiation(
        Uuid::new_v4(),
        "John".into(),
        "1".into(),
        30.0,
        None,
    ))
    .unwrap_err();
    assert!(err.is_not_found_error());

    let err = block_on(engine.accept_negotiation(ride.id, Uuid::new_v4())).unwrap_err();
    assert!(err.is_not_found_error());

    let offer = block_on(engine.create_negotiation(
        ride.id,
        None,
        "Alice".into(),
        "1".into(),
        30.0,
        None,
    ))
    .unwrap();
    let err = block_on(engine.accept_negotiation(Uuid::new_v4(), offer.id)).unwrap_err();
    assert!(err.is_not_found_error());

    assert!(block_on(engine.find_negotiations(Uuid::new_v4()))
        .unwrap()
        .is_empty());
}

#[test]
fn accept_requires_matching_ride() {
    use tokio_test::block_on;

    let (engine, ride) = setup();
    let other = block_on(engine.create_ride(
        "Jane".into(),
        "555-0000".into(),
        "Harbor".into(),
        "Station".into(),
        15.0,
    ))
    .unwrap();

    let offer = block_on(engine.create_negotiation(
        other.id,
        None,
        "Alice".into(),
        "1".into(),
        18.0,
        None,
    ))
    .unwrap();
    block_on(engine.create_negotiation(ride.id, None, "Bob".into(), "2".into(), 30.0, None))
        .unwrap();

    let err = block_on(engine.accept_negotiation(ride.id, offer.id)).unwrap_err();
    assert!(err.is_invalid_input_error());
    assert!(block_on(engine.find_ride(ride.id)).unwrap().agreed_driver_id.is_none());
}

#[test]
fn stable_driver_identity() {
    use tokio_test::block_on;

    let (engine, ride) = setup();
    let driver_id = Uuid::new_v4();

    let offer = block_on(engine.create_negotiation(
        ride.id,
        Some(driver_id),
        "Alice".into(),
        "1".into(),
        30.0,
        None,
    ))
    .unwrap();
    assert_eq!(offer.from_user_id, driver_id);

    let ride = block_on(engine.accept_negotiation(ride.id, offer.id)).unwrap();
    assert_eq!(ride.agreed_driver_id, Some(driver_id));
}

#[test]
fn invalid_offer_leaves_ride_untouched() {
    use crate::entities::RideStatus;
    use tokio_test::block_on;

    let (engine, ride) = setup();

    let err = block_on(engine.create_negotiation(
        ride.id,
        None,
        "Alice".into(),
        "1".into(),
        0.0,
        None,
    ))
    .unwrap_err();
    assert!(err.is_invalid_input_error());

    let ride = block_on(engine.find_ride(ride.id)).unwrap();
    assert_eq!(ride.status, RideStatus::Open);
    assert_eq!(ride.current_price, 25.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_offers_list_in_price_order() {
    use crate::db::MemoryStore;
    use std::sync::Arc;

    let engine = Arc::new(Engine::new(Arc::new(MemoryStore::new())));
    let ride_id = engine
        .create_ride(
            "John Doe".into(),
            "555-1234".into(),
            "Downtown Mall".into(),
            "Airport".into(),
            25.0,
        )
        .await
        .unwrap()
        .id;

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .create_negotiation(
                        ride_id,
                        None,
                        format!("driver {}", i),
                        "555".into(),
                        20.0 + i as f64,
                        None,
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        let offer = task.await.unwrap().unwrap();
        let stored = engine.find_negotiation(offer.id).await.unwrap();
        assert_eq!(stored, offer);
    }

    let negotiations = engine.find_negotiations(ride_id).await.unwrap();
    let ride = engine.find_ride(ride_id).await.unwrap();

    assert_eq!(negotiations.len(), 32);
    assert_eq!(
        negotiations.last().map(|n| n.offer_amount),
        Some(ride.current_price)
    );
}
