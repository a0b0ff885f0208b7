use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Negotiation;
use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub rider_name: String,
    pub rider_phone: String,
    pub origin: String,
    pub destination: String,
    pub initial_price: f64,
    pub current_price: f64,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub agreed_driver_id: Option<Uuid>,
    pub agreed_driver_name: Option<String>,
}

/// Ride lifecycle. Variants are declared in lifecycle order and a ride only
/// ever moves forward through them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    Negotiating,
    Agreed,
    Completed,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Negotiating => "negotiating",
            Self::Agreed => "agreed",
            Self::Completed => "completed",
        }
    }

    /// Statuses a ride can be in while it still takes offers.
    pub fn negotiable() -> &'static [Status] {
        &[Status::Open, Status::Negotiating]
    }
}

impl Ride {
    pub fn new(
        rider_name: String,
        rider_phone: String,
        origin: String,
        destination: String,
        initial_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rider_id: Uuid::new_v4(),
            rider_name,
            rider_phone,
            origin,
            destination,
            initial_price,
            current_price: initial_price,
            status: Status::Open,
            created_at: Utc::now(),
            agreed_driver_id: None,
            agreed_driver_name: None,
        }
    }

    pub fn is_negotiable(&self) -> bool {
        Status::negotiable().contains(&self.status)
    }

    /// A driver's opening offer moves the ride into negotiation at the
    /// offered price.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn receive_offer(&mut self, amount: f64) -> Result<(), Error> {
        match self.status {
            Status::Open | Status::Negotiating => {
                self.status = Status::Negotiating;
                self.current_price = amount;
                Ok(())
            }
            _ => Err(not_negotiable(self.status)),
        }
    }

    /// Counter-offers only move the price.
    #[tracing::instrument(skip(self), fields(ride_id = %self.id))]
    pub fn receive_counter(&mut self, amount: f64) -> Result<(), Error> {
        match self.status {
            Status::Open | Status::Negotiating => {
                self.current_price = amount;
                Ok(())
            }
            _ => Err(not_negotiable(self.status)),
        }
    }

    /// Locks the ride to the offer's price and sender. Whoever sent the
    /// accepted offer becomes the agreed driver, so accepting a rider's
    /// counter-offer records the rider here.
    #[tracing::instrument(skip(self, offer), fields(ride_id = %self.id, negotiation_id = %offer.id))]
    pub fn accept(&mut self, offer: &Negotiation) -> Result<(), Error> {
        if offer.ride_id != self.id {
            return Err(Error::invalid_input_error(
                "Negotiation does not belong to this ride",
            ));
        }

        match self.status {
            Status::Negotiating => {
                self.status = Status::Agreed;
                self.current_price = offer.offer_amount;
                self.agreed_driver_id = Some(offer.from_user_id);
                self.agreed_driver_name = Some(offer.from_user_name.clone());
                Ok(())
            }
            Status::Open => Err(Error::invalid_state_error(
                "Ride has no offers to accept",
            )),
            _ => Err(Error::invalid_state_error("Ride is already agreed")),
        }
    }
}

fn not_negotiable(status: Status) -> Error {
    tracing::info!(status = status.name(), "ride is not open for negotiation");
    Error::invalid_state_error("Ride is no longer available for negotiation")
}

#[cfg(test)]
fn ride() -> Ride {
    Ride::new(
        "John Doe".into(),
        "555-1234".into(),
        "Downtown Mall".into(),
        "Airport".into(),
        25.0,
    )
}

#[test]
fn new_ride_is_open_at_initial_price() {
    let ride = ride();

    assert_eq!(ride.status, Status::Open);
    assert_eq!(ride.current_price, 25.0);
    assert_eq!(ride.initial_price, 25.0);
    assert!(ride.agreed_driver_id.is_none());
    assert!(ride.is_negotiable());
}

#[test]
fn offer_moves_ride_into_negotiation() {
    let mut ride = ride();

    ride.receive_offer(30.0).unwrap();
    assert_eq!(ride.status, Status::Negotiating);
    assert_eq!(ride.current_price, 30.0);

    ride.receive_offer(28.0).unwrap();
    assert_eq!(ride.status, Status::Negotiating);
    assert_eq!(ride.current_price, 28.0);
    assert_eq!(ride.initial_price, 25.0);
}

#[test]
fn counter_changes_price_but_not_status() {
    let mut ride = ride();
    ride.receive_offer(30.0).unwrap();

    ride.receive_counter(27.0).unwrap();
    assert_eq!(ride.status, Status::Negotiating);
    assert_eq!(ride.current_price, 27.0);
}

#[test]
fn closed_rides_reject_offers_and_counters() {
    for status in [Status::Agreed, Status::Completed] {
        let mut ride = ride();
        ride.status = status;

        assert!(ride.receive_offer(30.0).unwrap_err().is_invalid_state_error());
        assert!(ride
            .receive_counter(30.0)
            .unwrap_err()
            .is_invalid_state_error());
        assert_eq!(ride.status, status);
        assert_eq!(ride.current_price, 25.0);
    }
}

#[test]
fn accept_locks_price_and_driver() {
    let mut ride = ride();
    let offer = Negotiation::offer(&ride, None, "Alice Smith".into(), "555-5678".into(), 30.0, None);
    ride.receive_offer(offer.offer_amount).unwrap();

    ride.accept(&offer).unwrap();

    assert_eq!(ride.status, Status::Agreed);
    assert_eq!(ride.current_price, 30.0);
    assert_eq!(ride.agreed_driver_id, Some(offer.from_user_id));
    assert_eq!(ride.agreed_driver_name.as_deref(), Some("Alice Smith"));
}

#[test]
fn accept_only_once() {
    let mut ride = ride();
    let first = Negotiation::offer(&ride, None, "Alice".into(), "1".into(), 30.0, None);
    let second = Negotiation::offer(&ride, None, "Bob".into(), "2".into(), 29.0, None);
    ride.receive_offer(first.offer_amount).unwrap();
    ride.receive_offer(second.offer_amount).unwrap();

    ride.accept(&first).unwrap();
    let err = ride.accept(&second).unwrap_err();

    assert!(err.is_invalid_state_error());
    assert_eq!(ride.agreed_driver_name.as_deref(), Some("Alice"));
    assert_eq!(ride.current_price, 30.0);
}

#[test]
fn accept_rejects_offer_for_another_ride() {
    let mut ride = ride();
    let other = self::ride();
    let offer = Negotiation::offer(&other, None, "Alice".into(), "1".into(), 30.0, None);
    ride.receive_offer(30.0).unwrap();

    assert!(ride.accept(&offer).unwrap_err().is_invalid_input_error());
    assert_eq!(ride.status, Status::Negotiating);
}

#[test]
fn status_serializes_as_lowercase_name() {
    for status in [
        Status::Open,
        Status::Negotiating,
        Status::Agreed,
        Status::Completed,
    ] {
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json, serde_json::json!(status.name()));
    }
}
