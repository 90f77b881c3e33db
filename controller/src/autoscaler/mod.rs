//! The Autoscaler Reconciler (§4.6): a cooldown-gated control loop that adjusts a collection's
//! desired replica count from observed player utilization.

pub mod logic;
pub mod reconcile;

pub use reconcile::{AutoscalerContext, sync};
