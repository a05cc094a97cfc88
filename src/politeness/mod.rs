//! Per-origin crawling etiquette
//!
//! - `PolicyStore` / `OriginPolicy`: robots rules, pacing parameters and
//!   backoff state for every origin seen in a session
//! - `PolitenessGate`: answers "may a request to this origin start now"

mod gate;
mod policy;

pub use gate::{GateDecision, PolitenessGate};
pub use policy::{OriginPolicy, OriginSnapshot, PacingParams, PolicyStore, RobotsStatus};
