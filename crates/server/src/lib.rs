//! HTTP surface of the modelbridge service.
//!
//! The `modelbridge` binary in `main.rs` wires these pieces to a real store and gateway.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
