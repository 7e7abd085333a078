//! One-shot reply routing over the shared channel.
//!
//! 1. **Classification** (`classify`): inbound message -> `Classification`
//! 2. **Correlation** (`correlation`): pending one-shot subscriptions keyed
//!    by classification, resolved by a match or a deadline, never both

pub mod classify;
pub mod correlation;

pub use classify::{Classification, Classify};
pub use correlation::{BusError, CorrelationBus, PendingReply};
