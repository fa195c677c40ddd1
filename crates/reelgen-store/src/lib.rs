//! Repositories for generation jobs and the clip catalog.
//!
//! Both are traits so the pipeline and API take injected handles; the
//! in-memory implementations back the server and the tests.

pub mod catalog;
pub mod error;
pub mod jobs;

pub use catalog::{ClipCatalog, InMemoryClipCatalog, ManifestEntry};
pub use error::{StoreError, StoreResult};
pub use jobs::{InMemoryJobStore, JobStore};
