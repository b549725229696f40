pub mod client;
pub mod error;
pub mod types;

pub use client::CloudClient;
pub use error::ApiError;

use crate::action::{Action, ActionId};

/// Source of fresh action snapshots.
///
/// The HTTP client implements this; tests plug in scripted sources so the
/// waiter can be driven without a network. The returned future is `Send` so
/// a wait can run on any worker of a multi-threaded runtime.
pub trait ActionSource: Send + Sync {
    /// Fetch the current snapshot of every action in `ids`.
    ///
    /// IDs the source does not know about may be missing from the result.
    fn fetch_actions(
        &self,
        ids: &[ActionId],
    ) -> impl Future<Output = Result<Vec<Action>, ApiError>> + Send;
}
