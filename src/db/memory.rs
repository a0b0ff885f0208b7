use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Effect, Mutation, Store};
use crate::entities::{Negotiation, Ride, RideStatus};
use crate::error::Error;

/// Process-local store. Documents keep insertion order and every transition
/// runs under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

#[derive(Debug, Default)]
struct Collections {
    rides: Vec<Ride>,
    negotiations: Vec<Negotiation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut collections = self.collections.lock().await;

        if collections.rides.iter().any(|r| r.id == ride.id) {
            return Err(Error::database_error("duplicate ride id"));
        }

        collections.rides.push(ride.clone());

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let collections = self.collections.lock().await;

        Ok(collections.rides.iter().find(|r| r.id == id).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn find_rides_by_status(
        &self,
        statuses: &[RideStatus],
        limit: usize,
    ) -> Result<Vec<Ride>, Error> {
        let collections = self.collections.lock().await;

        let rides = collections
            .rides
            .iter()
            .filter(|r| statuses.contains(&r.status))
            .take(limit)
            .cloned()
            .collect();

        Ok(rides)
    }

    #[tracing::instrument(skip(self))]
    async fn find_negotiation(&self, id: Uuid) -> Result<Option<Negotiation>, Error> {
        let collections = self.collections.lock().await;

        Ok(collections
            .negotiations
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn find_negotiations_by_ride(
        &self,
        ride_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Negotiation>, Error> {
        let collections = self.collections.lock().await;

        let mut negotiations: Vec<Negotiation> = collections
            .negotiations
            .iter()
            .filter(|n| n.ride_id == ride_id)
            .cloned()
            .collect();

        negotiations.sort_by_key(|n| n.timestamp);
        negotiations.truncate(limit);

        Ok(negotiations)
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn apply_transition(&self, ride_id: Uuid, mutation: Mutation) -> Result<Ride, Error> {
        let mut collections = self.collections.lock().await;

        let index = collections
            .rides
            .iter()
            .position(|r| r.id == ride_id)
            .ok_or_else(|| Error::not_found_error("Ride not found"))?;

        let mut ride = collections.rides[index].clone();
        let effects = mutation(&mut ride)?;

        // check every effect before touching anything so a bad one leaves
        // the collections as they were
        let mut accepted = Vec::new();
        for effect in &effects {
            match effect {
                Effect::InsertNegotiation(negotiation) => {
                    if collections.negotiations.iter().any(|n| n.id == negotiation.id) {
                        return Err(Error::database_error("duplicate negotiation id"));
                    }
                }
                Effect::AcceptNegotiation(id) => {
                    let position = collections
                        .negotiations
                        .iter()
                        .position(|n| n.id == *id && n.ride_id == ride_id)
                        .ok_or_else(|| Error::not_found_error("Negotiation not found"))?;
                    accepted.push(position);
                }
            }
        }

        collections.rides[index] = ride.clone();

        for position in accepted {
            collections.negotiations[position].is_accepted = true;
        }

        for effect in effects {
            if let Effect::InsertNegotiation(negotiation) = effect {
                collections.negotiations.push(negotiation);
            }
        }

        Ok(ride)
    }

    async fn close(&self) {}
}

#[cfg(test)]
fn ride() -> Ride {
    Ride::new("John".into(), "1".into(), "x".into(), "y".into(), 25.0)
}

#[test]
fn failed_mutation_writes_nothing() {
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let ride = ride();
    block_on(store.insert_ride(&ride)).unwrap();

    let err = block_on(store.apply_transition(
        ride.id,
        Box::new(|ride: &mut Ride| -> Result<Vec<Effect>, Error> {
            ride.receive_offer(30.0)?;
            Err(Error::invalid_state_error("nope"))
        }),
    ))
    .unwrap_err();

    assert!(err.is_invalid_state_error());
    assert_eq!(block_on(store.find_ride(ride.id)).unwrap(), Some(ride.clone()));
}

#[test]
fn unknown_accept_rolls_back_ride_update() {
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let ride = ride();
    block_on(store.insert_ride(&ride)).unwrap();

    let err = block_on(store.apply_transition(
        ride.id,
        Box::new(|ride: &mut Ride| -> Result<Vec<Effect>, Error> {
            ride.receive_offer(30.0)?;
            Ok(vec![Effect::AcceptNegotiation(Uuid::new_v4())])
        }),
    ))
    .unwrap_err();

    assert!(err.is_not_found_error());
    let stored = block_on(store.find_ride(ride.id)).unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Open);
    assert_eq!(stored.current_price, 25.0);
}

#[test]
fn transition_on_unknown_ride() {
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let noop: Mutation = Box::new(|_: &mut Ride| -> Result<Vec<Effect>, Error> { Ok(vec![]) });
    let err = block_on(store.apply_transition(Uuid::new_v4(), noop)).unwrap_err();

    assert!(err.is_not_found_error());
}

#[test]
fn listing_filters_and_caps() {
    use tokio_test::block_on;

    let store = MemoryStore::new();
    let mut ids = Vec::new();
    for _ in 0..5 {
        let ride = ride();
        ids.push(ride.id);
        block_on(store.insert_ride(&ride)).unwrap();
    }

    block_on(store.apply_transition(
        ids[0],
        Box::new(|ride: &mut Ride| -> Result<Vec<Effect>, Error> {
            ride.status = RideStatus::Agreed;
            Ok(vec![])
        }),
    ))
    .unwrap();

    let rides = block_on(store.find_rides_by_status(RideStatus::negotiable(), 3)).unwrap();
    let listed: Vec<Uuid> = rides.iter().map(|r| r.id).collect();

    assert_eq!(listed, ids[1..4].to_vec());
}
