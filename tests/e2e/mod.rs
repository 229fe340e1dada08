//! End-to-end tests for loyalty-core.
//!
//! These drive the public API the way the login handler and the scheduler
//! do: challenges through [`loyalty_core::ChallengeStore`], trial batches
//! through a built [`loyalty_core::RunningService`].

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod challenge_flow;
mod harness;
mod trial_lifecycle;
