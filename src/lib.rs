pub mod core;
pub mod events;
pub mod logging;

pub use crate::core::pool::{Endpoint, EndpointId, EndpointKind, Outcome, ProxyPool};
pub use crate::core::select::{SelectionRequest, Strategy};
