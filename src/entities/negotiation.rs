use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Ride;

/// A priced proposal from one party of a ride to the other. Counter-offers
/// point back at the offer they answer through `parent_negotiation_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub from_user_id: Uuid,
    pub from_user_name: String,
    pub from_user_phone: String,
    pub to_user_id: Uuid,
    pub to_user_name: String,
    pub offer_amount: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_negotiation_id: Option<Uuid>,
}

impl Negotiation {
    /// Opening offer from a driver to the ride's rider. Without a `driver_id`
    /// the driver gets a fresh identity for this offer.
    pub fn offer(
        ride: &Ride,
        driver_id: Option<Uuid>,
        driver_name: String,
        driver_phone: String,
        offer_amount: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id: ride.id,
            from_user_id: driver_id.unwrap_or_else(Uuid::new_v4),
            from_user_name: driver_name,
            from_user_phone: driver_phone,
            to_user_id: ride.rider_id,
            to_user_name: ride.rider_name.clone(),
            offer_amount,
            message: or_default(message, || {
                format!("I can do this ride for ${:?}", offer_amount)
            }),
            timestamp: Utc::now(),
            is_accepted: false,
            parent_negotiation_id: None,
        }
    }

    /// Answer to this offer: the recipient becomes the sender and vice versa.
    pub fn counter(
        &self,
        from_user_name: String,
        from_user_phone: String,
        offer_amount: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id: self.ride_id,
            from_user_id: self.to_user_id,
            from_user_name,
            from_user_phone,
            to_user_id: self.from_user_id,
            to_user_name: self.from_user_name.clone(),
            offer_amount,
            message: or_default(message, || format!("How about ${:?}?", offer_amount)),
            timestamp: Utc::now(),
            is_accepted: false,
            parent_negotiation_id: Some(self.id),
        }
    }
}

// blank text counts as no message
fn or_default(message: Option<String>, default: impl FnOnce() -> String) -> String {
    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(default)
}

#[test]
fn offer_goes_from_driver_to_rider() {
    let ride = Ride::new(
        "John Doe".into(),
        "555-1234".into(),
        "Downtown Mall".into(),
        "Airport".into(),
        25.0,
    );

    let offer = Negotiation::offer(
        &ride,
        None,
        "Alice Smith".into(),
        "555-5678".into(),
        30.0,
        None,
    );

    assert_eq!(offer.ride_id, ride.id);
    assert_eq!(offer.to_user_id, ride.rider_id);
    assert_eq!(offer.to_user_name, "John Doe");
    assert_ne!(offer.from_user_id, ride.rider_id);
    assert_eq!(offer.message, "I can do this ride for $30.0");
    assert!(!offer.is_accepted);
    assert_eq!(offer.parent_negotiation_id, None);
}

#[test]
fn offer_keeps_stable_driver_id() {
    let ride = Ride::new("a".into(), "1".into(), "x".into(), "y".into(), 10.0);
    let driver_id = Uuid::new_v4();

    let first = Negotiation::offer(&ride, Some(driver_id), "d".into(), "2".into(), 12.0, None);
    let second = Negotiation::offer(&ride, Some(driver_id), "d".into(), "2".into(), 11.0, None);

    assert_eq!(first.from_user_id, driver_id);
    assert_eq!(second.from_user_id, driver_id);
}

#[test]
fn counter_swaps_parties() {
    let ride = Ride::new("John".into(), "1".into(), "x".into(), "y".into(), 25.0);
    let offer = Negotiation::offer(
        &ride,
        None,
        "Alice".into(),
        "2".into(),
        30.0,
        Some("I can do this ride safely".into()),
    );

    let counter = offer.counter("John".into(), "1".into(), 27.0, None);

    assert_eq!(counter.from_user_id, offer.to_user_id);
    assert_eq!(counter.to_user_id, offer.from_user_id);
    assert_eq!(counter.to_user_name, "Alice");
    assert_eq!(counter.ride_id, offer.ride_id);
    assert_eq!(counter.parent_negotiation_id, Some(offer.id));
    assert_eq!(counter.message, "How about $27.0?");
    assert!(counter.timestamp >= offer.timestamp);

    let reply = counter.counter("Alice".into(), "2".into(), 28.5, None);
    assert_eq!(reply.from_user_id, offer.from_user_id);
    assert_eq!(reply.to_user_id, ride.rider_id);
    assert_eq!(reply.parent_negotiation_id, Some(counter.id));
}

#[test]
fn blank_messages_get_defaults() {
    let ride = Ride::new("John".into(), "1".into(), "x".into(), "y".into(), 25.0);

    let offer = Negotiation::offer(
        &ride,
        None,
        "Alice".into(),
        "2".into(),
        30.0,
        Some(String::new()),
    );
    assert_eq!(offer.message, "I can do this ride for $30.0");

    let counter = offer.counter("John".into(), "1".into(), 27.125, Some("   ".into()));
    assert_eq!(counter.message, "How about $27.125?");
}
