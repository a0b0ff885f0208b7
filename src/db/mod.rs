mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{Negotiation, Ride, RideStatus};
use crate::error::Error;

/// Writes that ride along with a ride update and commit together with it.
#[derive(Clone, Debug)]
pub enum Effect {
    InsertNegotiation(Negotiation),
    AcceptNegotiation(Uuid),
}

/// Changes a locked ride in place and names the writes that go with it.
/// Returning an error aborts the transition without writing anything.
pub type Mutation = Box<dyn FnOnce(&mut Ride) -> Result<Vec<Effect>, Error> + Send>;

/// Document storage for rides and their negotiations.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;

    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;

    /// Rides whose status is one of `statuses`, oldest first.
    async fn find_rides_by_status(
        &self,
        statuses: &[RideStatus],
        limit: usize,
    ) -> Result<Vec<Ride>, Error>;

    async fn find_negotiation(&self, id: Uuid) -> Result<Option<Negotiation>, Error>;

    /// Negotiations of a ride in ascending timestamp order.
    async fn find_negotiations_by_ride(
        &self,
        ride_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Negotiation>, Error>;

    /// Runs `mutation` against the ride while holding it exclusively, then
    /// stores the ride and the returned effects as one unit.
    async fn apply_transition(&self, ride_id: Uuid, mutation: Mutation) -> Result<Ride, Error>;

    async fn close(&self);
}
