#![deny(clippy::unwrap_used, clippy::expect_used)]

mod state;
mod store;
mod task;

pub use state::StateChange;
pub use state::StoreState;
pub use state::reduce;
pub use store::DeleteTarget;
pub use store::FetchOutcome;
pub use store::NewTask;
pub use store::RefreshSession;
pub use store::Result;
pub use store::StoreError;
pub use store::TaskPatch;
pub use store::TaskStore;
pub use task::Task;
