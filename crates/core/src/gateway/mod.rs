//! Client side of the external CAD translation service.

mod aps;
mod types;

pub use aps::ApsGateway;
pub use types::*;
