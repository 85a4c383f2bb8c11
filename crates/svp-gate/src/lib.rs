//! Alert gating.
//!
//! Two stages decide whether a signal instance is new enough to notify on:
//! - [`ClusterBuffer`] (Stage A) absorbs repeats of an unchanged signal
//! - [`CooldownDispatcher`] (Stage B) requires a decisive, confident signal
//!   that is not a repeat inside the cooldown
//!
//! The same dispatcher, with a permissive [`DispatchPolicy`] and a global
//! [`CooldownScope`], gates snapshot persistence.

pub mod cluster;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod fingerprint;

pub use cluster::{ClusterBuffer, ClusterDecision, ClusterInfo};
pub use config::GateConfig;
pub use cooldown::{CooldownDispatcher, CooldownScope, DispatchDecision, DispatchPolicy, SkipReason};
pub use error::{GateError, GateResult};
pub use fingerprint::SignalFingerprint;
