//! Permission matrix side-state with optimistic locking.

pub mod matrix;
pub mod service;
pub mod store;

pub use matrix::{Modules, PermissionMatrix};
pub use service::PermissionMatrixService;
pub use store::{LanceMatrixStore, MatrixStore, MemoryMatrixStore};
