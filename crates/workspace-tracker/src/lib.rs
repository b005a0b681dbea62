//! Workspace tracking for the agent's working directory.
//!
//! A [`WorkspaceTracker`] runs one background loop that snapshots three
//! facets of a git repository on a fixed interval:
//!
//! - **status**: branch, upstream, ahead/behind and every changed file with
//!   its patch
//! - **files**: the sorted list of tracked paths
//! - **diff**: per-file line counts and patches against the diff base
//!
//! Each facet is cached and fanned out to its own subscribers. A facet that
//! fails to refresh keeps its previous value.

mod collect;
mod error;
mod git;
pub mod parse;
mod tracker;
mod types;

pub use error::{TrackerError, TrackerResult};
pub use git::GitCommandRunner;
pub use mailbox_fanout::{Subscription, SubscriptionId};
pub use tracker::{RefreshOutcome, WorkspaceTracker};
pub use types::{DiffSnapshot, FileChange, FileChangeKind, FileDiff, FilesSnapshot, StatusSnapshot};
