//! # loyalty-core
//!
//! Login challenge management and trial subscription lifecycle for the
//! loyalty platform.
//!
//! ## Components
//!
//! - [`challenge::ChallengeStore`]: single-use, five-minute login nonces keyed
//!   by wallet address or other principal
//! - [`challenge::ExpirySweeper`]: background purge of challenges nobody
//!   came back for
//! - [`trial::TrialLifecycleProcessor`]: idempotent batches that send 7/3/1-day
//!   trial warnings and downgrade expired trials
//! - [`service::RunningService`]: worker process running the sweeper and the
//!   trial scheduler until shutdown
//!
//! ## Example
//!
//! ```rust
//! use loyalty_core::challenge::ChallengeStore;
//!
//! let store = ChallengeStore::new();
//! let token = store.generate("0xAbC");
//! assert!(store.verify("0xabc", &token));
//! assert!(!store.verify("0xabc", &token));
//! ```

pub mod challenge;
pub mod config;
pub mod error;
pub mod event;
pub mod service;
pub mod trial;

pub use challenge::{ChallengeStore, ExpirySweeper};
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use event::{ServiceEvent, ServiceEventsChannel};
pub use service::{RunningService, ServiceBuilder, ShutdownHandle};
pub use trial::{
    MemorySubscriptionStore, NotificationGateway, SubscriptionStore, TrialLifecycleProcessor,
    TrialStatus, TrialSubscription,
};
