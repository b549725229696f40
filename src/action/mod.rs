mod types;
mod watch_set;

pub use types::{Action, ActionErrorInfo, ActionId, ActionResource, ActionStatus};
pub use watch_set::{Applied, WatchSet};
