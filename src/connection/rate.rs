//! # Rate Limiting Policy
//!
//! Strategy consulted from the connection's periodic rate recompute. Held by
//! composition on the connection itself rather than through a subclassed
//! connection type; a connection without a policy never rate-kicks.

use crate::error::{ProtocolError, Result};

/// Smoothed inbound-rate ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitingPolicy {
    limit: f32,
}

impl RateLimitingPolicy {
    pub fn new(limit: f32) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> f32 {
        self.limit
    }

    /// Check the smoothed inbound rate against the ceiling.
    pub fn check(&self, average_received: f32) -> Result<()> {
        if average_received > self.limit {
            Err(ProtocolError::RateExceeded {
                average: average_received,
                limit: self.limit,
            })
        } else {
            Ok(())
        }
    }
}
