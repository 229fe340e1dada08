//! Wallet-login challenge issuance and verification.
//!
//! A login handler asks for a challenge, the wallet signs it, and the handler
//! checks the signed response against the outstanding challenge:
//!
//! ```text
//! login request
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ generate(principal) │──► token (overwrites any earlier one)
//! └─────────────────────┘
//!        │
//!   signed response
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ verify(principal,   │
//! │        token)       │
//! └─────────┬───────────┘
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  MATCH       ABSENT / EXPIRED / MISMATCH
//!    │             │
//!    ▼             ▼
//! consume,      false
//!  true        (store untouched)
//! ```
//!
//! Challenges nobody comes back for are removed by the [`ExpirySweeper`].

mod store;
mod sweeper;

pub use store::{normalize_principal, ChallengeStats, ChallengeStore, DEFAULT_CHALLENGE_TTL};
pub use sweeper::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
