//! SCIM 2.0 resource store for Rust.
//!
//! Compiles SCIM filters into storage predicates, applies PATCH operations
//! to stored Users and Groups, and stamps every resource with a
//! deterministic weak ETag. Storage is pluggable through
//! [`storage::StorageProvider`]; an in-memory implementation is included.
//!
//! # Core Components
//!
//! - [`Backend`] - create, replace, get, delete, patch and search use-cases
//! - [`filter`] - filter parser, Predicate Registry and Filter Compiler
//! - [`patch`] - PATCH path resolution and the Patch Engine
//! - [`EtagComputer`] - deterministic version stamps
//! - [`storage`] - the storage contract, predicates and [`InMemoryStorage`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scim_store::{BackendBuilder, InMemoryStorage};
//! use scim_store::patch::{PatchOperation, PatchRequest};
//! use scim_store::resource::User;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = BackendBuilder::new(InMemoryStorage::new())
//!     .with_base_url("https://scim.example.com")
//!     .build()?;
//!
//! let user = backend.create_user(User::new("bjensen")).await?;
//! let id = user.id.unwrap();
//!
//! let request = PatchRequest::new(vec![PatchOperation::add(
//!     "emails",
//!     json!({"value": "bjensen@example.com", "primary": true}),
//! )]);
//! let patched = backend.patch_user(&id, &request).await?;
//! assert_eq!(patched.emails.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod filter;
pub mod patch;
pub mod resource;
pub mod storage;

// Re-export commonly used types for convenience
pub use backend::{
    Backend, BackendBuilder, BackendConfig, ListResponse, SearchRequest, SearchScope, WriteHook,
};
pub use error::{BuildError, ScimError, ScimResult, ValidationError};
pub use filter::{CompiledFilter, FilterParser, ScimFilterParser};
pub use patch::{PatchEngine, PatchOperation, PatchRequest};
pub use resource::{EtagComputer, Group, HttpVersion, ResourceType, User};
pub use storage::{InMemoryStorage, Predicate, StorageError, StorageProvider};
