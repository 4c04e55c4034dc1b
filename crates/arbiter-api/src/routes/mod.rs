//! # API Route Modules
//!
//! - `resolutions` — create, list, confirm, finalize; audit trail replay.
//! - `disputes` — file, list, inspect, and review disputes.
//! - `markets` — per-market resolution history.
//!
//! Every mutating handler takes the actor from [`CallerIdentity`] and hands
//! the request to the workflow; no business rule is evaluated here.
//!
//! [`CallerIdentity`]: crate::auth::CallerIdentity

pub mod disputes;
pub mod markets;
pub mod resolutions;
