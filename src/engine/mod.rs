mod negotiation_api;
mod ride_api;

use std::sync::Arc;

use crate::{api::API, db::Store, error::Error};

pub struct Engine {
    store: Arc<dyn Store>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl API for Engine {}

fn require_text(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        tracing::info!(field, "rejecting empty field");
        return Err(Error::invalid_input_error(format!("{} must not be empty", field)));
    }

    Ok(())
}

fn require_price(field: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || value <= 0.0 {
        tracing::info!(field, value, "rejecting non-positive amount");
        return Err(Error::invalid_input_error(format!("{} must be positive", field)));
    }

    Ok(())
}

#[test]
fn validation() {
    assert!(require_text("rider_name", "John").is_ok());
    assert!(require_text("rider_name", "  ").unwrap_err().is_invalid_input_error());

    assert!(require_price("offer_amount", 0.5).is_ok());
    for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
        assert!(require_price("offer_amount", bad)
            .unwrap_err()
            .is_invalid_input_error());
    }
}
