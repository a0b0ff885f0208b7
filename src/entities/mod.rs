mod negotiation;
mod ride;

pub use negotiation::Negotiation;
pub use ride::{Ride, Status as RideStatus};
