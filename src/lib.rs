//! # litellm-router-core
//!
//! The routing core of a unified, multi-provider LLM gateway: deployment
//! selection under a pluggable strategy (latency-based, weighted,
//! usage-based, least-busy, simple-shuffle), per-deployment rolling
//! latency/TTFT/rpm/tpm state, cooldown-aware retry and fallback, a
//! parallel health-check subsystem, and a single-flight response cache.
//!
//! Per-provider wire translation, YAML/env config loading, admin/project/
//! team CRUD, and customer-facing HTTP framing are explicitly out of scope
//! — this crate only depends on the [`core::providers::ProviderClient`] and
//! [`core::store::Store`] trait boundaries a host application supplies.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use litellm_router_core::core::providers::ProviderRegistry;
//! use litellm_router_core::core::router::deployment::{Deployment, ModelGroup};
//! use litellm_router_core::core::router::router::{Router, RouterSurface};
//! use litellm_router_core::core::router::RouterConfig;
//! use litellm_router_core::core::store::InMemoryStore;
//! use litellm_router_core::core::cache::InMemoryCache;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let group = ModelGroup::new(
//!         "gpt-3.5-turbo",
//!         vec![Deployment::new("d1", "gpt-3.5-turbo", serde_json::json!({"provider": "openai"}))],
//!     )
//!     .unwrap();
//!
//!     let router = Router::new(
//!         vec![group],
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(InMemoryCache::new()),
//!         Arc::new(ProviderRegistry::new()),
//!         RouterConfig::default(),
//!     );
//!
//!     let _ = router
//!         .completion("gpt-3.5-turbo", serde_json::json!([]), false, serde_json::json!({}))
//!         .await;
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod core;
pub mod utils;

pub use utils::error::{GatewayError, Result};

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Description of the crate.
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_cargo_package_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
        assert_eq!(NAME, env!("CARGO_PKG_NAME"));
        assert_eq!(DESCRIPTION, env!("CARGO_PKG_DESCRIPTION"));
    }
}
