pub mod api_types;
pub mod client;
pub mod error;
pub mod types;

pub use client::{TaskApi, TaskClient};
pub use error::ApiError;
pub use types::{Task, TaskDraft, TaskListPage, TaskPatch};
