//! Router core: deployment model, selection strategies, retry/fallback,
//! cooldown, metrics, health checks, telemetry, and the orchestrating
//! [`router::Router`] itself.
//!
//! Each file is one leaf component, wired together by `router.rs`.

pub mod config;
pub mod cooldown;
pub mod deployment;
pub mod error;
pub mod health;
pub mod metrics;
pub mod retry;
pub mod router;
pub mod selector;
pub mod state;
pub mod telemetry;

pub use config::RouterConfig;
pub use cooldown::CooldownManager;
pub use deployment::{Deployment, DeploymentCaps, DeploymentId, ModelGroup, SelectionStrategy};
pub use error::RouterError;
pub use health::{HealthChecker, HealthStatus, ReadinessSnapshot};
pub use metrics::MetricsRecorder;
pub use retry::RetryFallbackEngine;
pub use router::{Router, RouterSurface};
pub use selector::{DeploymentSelector, SelectionContext, SelectionTrace};
pub use state::DeploymentState;
pub use telemetry::{StandardLoggingPayload, TelemetryBus};
