//! Admission coordination for a pool of workers.
//!
//! The coordinator is a single sequential decision-maker: it broadcasts each
//! submitted job to every worker, tallies Accept/Reject replies against a
//! quorum, and resolves to a terminal decision under a deadline.
//!
//! # Components
//!
//! - [`AdmissionCoordinator`]: public handle that spawns and feeds the loop
//! - `Machine`: the (state, event) transition table
//! - `DeferralQueue`: FIFO stash for events that arrive mid-decision
//! - `QuorumTally`: outstanding-reply bookkeeping
//! - `TimeoutGuard`: cancellable decision deadline
//!
//! # Decision Flow
//!
//! 1. A submission in the idle state broadcasts a probe to the pool
//! 2. The expected reply count is adopted (static, or queried per decision)
//! 3. The first Accept admits the job outright; unanimous rejection or the
//!    deadline rejects it
//! 4. Deferred events replay in arrival order as soon as the decision ends

mod deferral;
pub(crate) mod event;
mod handle;
mod machine;
mod tally;
mod timeout;

pub use handle::{AdmissionCoordinator, PendingAdmission};
