//! Router-specific error surface, converting into [`GatewayError`] at the
//! boundary.

pub use crate::core::router::cooldown::CooldownReason;
use crate::utils::error::GatewayError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error("model group not found: {0}")]
    ModelGroupNotFound(String),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("all deployments in cooldown for model group: {0}")]
    AllDeploymentsInCooldown(String),
}

impl From<RouterError> for GatewayError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::ModelGroupNotFound(name) => {
                GatewayError::not_found(format!("model group '{name}'"))
            }
            RouterError::DeploymentNotFound(id) => {
                GatewayError::not_found(format!("deployment '{id}'"))
            }
            RouterError::AllDeploymentsInCooldown(name) => {
                GatewayError::no_deployments_available(name, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_group_not_found_maps_to_not_found() {
        let err: GatewayError = RouterError::ModelGroupNotFound("gpt-4".into()).into();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }
}
