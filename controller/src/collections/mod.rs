//! The Collection Reconciler (§4.4): enforces desired vs. actual replica count for a
//! `GameServerCollection`, materializing/retiring `GameServer` children and rolling their status
//! back up.

pub mod actions;
pub mod logic;
pub mod reconcile;

pub use reconcile::{CollectionContext, sync};
