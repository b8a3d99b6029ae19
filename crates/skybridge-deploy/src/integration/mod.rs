//! Wiring deployed aliases into API gateways and identity pools
//!
//! Runs after convergence and only for units that reached
//! [`AliasBound`](crate::unit::ConvergenceState::AliasBound). Each item
//! (route, authorizer, trigger) fails on its own: the error is logged,
//! counted in the [`WiringSummary`] and the next item proceeds.

pub mod gateway;
pub mod identity;

use serde::Serialize;
use std::ops::AddAssign;

pub use gateway::{GatewaySettings, GatewayWiring, STAGE_ALIAS_VARIABLE};
pub use identity::{IdentitySettings, IdentityWiring};

/// Per-item wiring counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WiringSummary {
    pub applied: usize,
    /// Dry run: item located, nothing applied
    pub planned: usize,
    pub failed: usize,
}

impl WiringSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl AddAssign for WiringSummary {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.planned += other.planned;
        self.failed += other.failed;
    }
}
