//! Permission request/result types and resource paths.

mod path;
mod types;

pub use path::{InitStatus, ResourcePath};
pub use types::{IssuedPermission, PermissionMode, PermissionRequest};
