//! Out-of-band confirmation handling
//!
//! The pipeline returns as soon as a transaction is submitted. Finality is
//! reported later by a [`ConfirmationSource`] and consumed by the
//! [`ConfirmationTracker`].

pub mod event;
pub mod tracker;

pub use event::{
    ConfirmationBus, ConfirmationDetails, ConfirmationEvent, ConfirmationSource, Finality,
};
pub use tracker::{
    ConfirmationOutcome, ConfirmationResult, ConfirmationTracker, FetchStatus,
    PendingConfirmation,
};
