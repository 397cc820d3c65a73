//! Key-value persistence stacks for Alicerce.
//!
//! A persistence stack stores opaque byte payloads under string keys. The
//! fetch orchestrator uses it as a cache in front of (or behind) the network:
//! a missing key is a cache miss, reported as `Ok(None)` rather than an error.
//!
//! # Architecture
//!
//! - **`PersistenceStack` trait**: callback-based contract every store implements
//! - **`MemoryPersistenceStack`**: in-memory store bounded by a total byte size
//! - **`DiskMemoryPersistenceStack`**: memory cache in front of one file per key
//! - **`metrics`**: optional timing of memory and disk accesses
//!
//! # Usage
//!
//! ```rust
//! use alicerce_persistence::{MemoryPersistenceStack, PersistenceStack};
//! use bytes::Bytes;
//!
//! let stack = MemoryPersistenceStack::new(1024);
//!
//! stack.set_object(Bytes::from_static(b"{}"), "profile", Box::new(|result| {
//!     assert!(result.is_ok());
//! }));
//!
//! stack.object("profile", Box::new(|result| {
//!     assert_eq!(result.unwrap(), Some(Bytes::from_static(b"{}")));
//! }));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod disk;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod stack;

pub use disk::{DiskMemoryConfig, DiskMemoryPersistenceStack};
pub use error::{PersistenceError, Result};
pub use memory::MemoryPersistenceStack;
pub use metrics::{Access, PersistencePerformanceTracker, Usage};
pub use stack::{PersistenceCompletion, PersistenceStack};
