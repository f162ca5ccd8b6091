//! Integration tests for the SCIM store use-cases.
//!
//! Every test drives a [`scim_store::Backend`] through its public API and
//! checks the outcome both in the returned resource and in storage.
//!
//! ## Test Principles
//!
//! 1. Validation failures write nothing
//! 2. Version stamps change exactly when stored content changes
//! 3. Filters that cannot match a resource type never query it

pub mod lifecycle;
pub mod patch;
pub mod search;
