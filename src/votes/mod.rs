//! Vote-credit reconciliation for external bot directories.
//!
//! Directory sites deliver a webhook when a user votes for the bot. This
//! module authenticates the delivery against the directory's shared token,
//! adapts the site-specific payload, credits the vote exactly once per vote
//! window through the store's idempotency ledger, and classifies where a
//! user can still vote right now.

pub mod checker;
pub mod reconciler;
pub mod sources;

use thiserror::Error;

use crate::storage::StoreError;

/// Errors from webhook handling, vote crediting, and status checks.
#[derive(Debug, Error)]
pub enum VoteError {
    /// The webhook key does not name a configured directory.
    #[error("unknown directory: {0}")]
    UnknownDirectory(String),

    /// Missing Authorization, token mismatch, or a payload naming a foreign
    /// bot.
    #[error("unauthorized webhook source")]
    UnauthorizedSource,

    /// The payload failed to parse or lacked a usable user id.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The voter could not be resolved to a real chat account.
    #[error("unknown external user: {0}")]
    UnknownExternalUser(u64),

    /// The vote-status endpoint did not answer inside the deadline.
    #[error("vote check timed out after {secs}s")]
    UpstreamTimeout { secs: u64 },

    /// The vote-status endpoint answered with an error.
    #[error("vote check failed: {0}")]
    CheckFailed(String),

    /// Wrapper around storage failures.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(feature = "vote-check")]
pub use checker::HttpVoteChecker;
pub use checker::VoteChecker;
pub use reconciler::{
    Notifier, UserResolver, VoteCredit, VoteOutcome, VoteOverviewEntry, VoteReconciler,
    VoteStanding, VOTER_RIBBON,
};
pub use sources::{
    Directory, DirectoryConfig, DirectoryError, DirectoryTable, PayloadFormat, VotePayload,
};
