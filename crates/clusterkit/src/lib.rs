//! # clusterkit
//!
//! Backends for the [`declarative`] submission engine.
//!
//! This crate provides two implementations of [`declarative::ResourceApi`]:
//! - [`RestClient`]: a blocking client for Kubernetes-style REST API servers
//! - [`MemoryCluster`]: an in-memory cluster for tests and offline rehearsal
//!
//! Both rely on the [`kinds`] table to know how each resource kind is served.
//!
//! ## Example
//!
//! ```
//! use clusterkit::MemoryCluster;
//! use declarative::{ResourceDeclaration, ResourceId, submit_simple};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let cluster = Arc::new(MemoryCluster::new());
//! let claim = ResourceDeclaration::new(
//!     ResourceId::namespaced("PersistentVolumeClaim", "default", "nfs"),
//!     "v1",
//!     json!({"spec": {"accessModes": ["ReadWriteMany"]}}).as_object().cloned().unwrap(),
//! )
//! .unwrap();
//!
//! let report = submit_simple(vec![claim], cluster.clone()).unwrap();
//! assert!(report.is_success());
//! assert_eq!(cluster.ids().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod kinds;
pub mod memory;
pub mod rest;

pub use error::{Error, Result};
pub use kinds::KindInfo;
pub use memory::{Call, CallKind, MemoryCluster};
pub use rest::{RestClient, RestConfig};
