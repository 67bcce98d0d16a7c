//! Ambient utilities shared across the router core.
//!
//! Per-provider wire translation, config loading, and HTTP framing utilities
//! live outside this crate; what remains here is the error-handling
//! stack plus the couple of free functions the
//! router itself needs (trace id generation).

pub mod error;

use uuid::Uuid;

/// Generate a fresh `trace_id` for a request that didn't supply one.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        assert_ne!(generate_trace_id(), generate_trace_id());
    }
}
