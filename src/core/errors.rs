//! Engine error taxonomy.
//!
//! Every error is a synchronous decision outcome reported to the caller; the
//! engine never retries internally and never substitutes caller intent.

use thiserror::Error;

use super::pool::EndpointId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No candidate survived the selection filter. Terminal for this request;
    /// the caller decides whether to widen constraints or wait.
    #[error("no eligible endpoint for domain {domain}")]
    NoEligibleEndpoint { domain: String },

    /// An outcome was reported for an endpoint id the pool does not know.
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),
}
