pub mod health;
pub mod negotiations;
pub mod rides;

use uuid::Uuid;

use crate::error::Error;

/// Ids that cannot name a document are reported the same way as ids that
/// name nothing.
fn parse_id(value: &str, not_found: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(|_| Error::not_found_error(not_found))
}
