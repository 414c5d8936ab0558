//! # escrowdesk-guard
//!
//! **Rate & Fraud Guard**: the checks that gate entry into the order book
//! and the reconciliation claim step.
//!
//! 1. **RateLimiter**: two independent sliding windows per user
//!    (general commands, order placements), pruned lazily on each check
//!    and swept for idle users by [`RateLimiter::prune`]
//! 2. **Duplicate check**: one active order per (owner, side, amount)
//! 3. **PaymentClaims**: short-TTL exclusivity markers keyed by
//!    (deal, amount) so one balance delta is processed at most once
//!
//! ```text
//! command ─▶ RateLimiter.check_command() ─▶ check_duplicate()
//!         ─▶ RateLimiter.check_order() ─▶ OrderBook
//!
//! reconciliation ─▶ PaymentClaims.try_claim() ─▶ Deal transition
//! ```

pub mod claims;
pub mod duplicate;
pub mod rate_limiter;

pub use claims::PaymentClaims;
pub use duplicate::check_duplicate;
pub use rate_limiter::{RateLimiter, SlidingWindow};
