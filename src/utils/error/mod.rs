//! Error handling for the router core
//!
//! A single [`GatewayError`] enum and crate-wide [`Result`] alias. Variants
//! map 1:1 onto the external error contract;
//! ambient concerns (serialization, io, the optional Redis store) are
//! folded in alongside so callers only ever match on one enum.

mod helpers;
mod response;
mod types;

pub use response::{ErrorDetail, ErrorResponse};
pub use types::{GatewayError, Result};
