//! Performance metrics of memory and disk accesses.
//!
//! A [`DiskMemoryPersistenceStack`](crate::DiskMemoryPersistenceStack) with a
//! tracker measures every memory and disk read and write. Successful
//! accesses carry the payload size and the total size used by the storage
//! they touched; failed ones carry the error.

use crate::error::PersistenceError;
use alicerce_core::metrics::{Metadata, PerformanceMetricsTracker, Token, TracingPerformanceTracker};

/// Metadata key for the size of the payload read or written.
pub const SIZE_KEY: &str = "size";

/// Metadata key for the memory used after a memory access.
pub const TOTAL_RAM_KEY: &str = "total_ram";

/// Metadata key for the disk used after a disk access.
pub const TOTAL_DISK_KEY: &str = "total_disk";

/// Metadata key for the error of a failed access.
pub const ERROR_KEY: &str = "error";

/// A measured storage access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Reading a payload from the memory cache
    ReadMemory,
    /// Writing a payload to the memory cache
    WriteMemory,
    /// Reading a payload file
    ReadDisk,
    /// Writing a payload file
    WriteDisk,
}

impl Access {
    /// The default measurement identifier of this access.
    pub fn identifier(self) -> &'static str {
        match self {
            Access::ReadMemory => "read_memory",
            Access::WriteMemory => "write_memory",
            Access::ReadDisk => "read_disk",
            Access::WriteDisk => "write_disk",
        }
    }

    fn total_key(self) -> &'static str {
        match self {
            Access::ReadMemory | Access::WriteMemory => TOTAL_RAM_KEY,
            Access::ReadDisk | Access::WriteDisk => TOTAL_DISK_KEY,
        }
    }
}

/// Sizes reported by a successful access, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Size of the payload read or written (0 for a miss)
    pub size: u64,
    /// Total size used by the accessed storage afterwards
    pub total: u64,
}

/// A tracker that knows how to describe storage accesses.
pub trait PersistencePerformanceTracker: PerformanceMetricsTracker {
    /// The identifier of an access measurement.
    fn make_identifier(&self, access: Access) -> String {
        access.identifier().to_string()
    }

    /// The metadata of an access measurement.
    fn make_metadata(&self, access: Access, outcome: Result<Usage, &PersistenceError>) -> Metadata {
        match outcome {
            Ok(usage) => Metadata::from([
                (SIZE_KEY.to_string(), usage.size.to_string()),
                (access.total_key().to_string(), usage.total.to_string()),
            ]),
            Err(error) => Metadata::from([(ERROR_KEY.to_string(), error.to_string())]),
        }
    }
}

impl PersistencePerformanceTracker for TracingPerformanceTracker {}

/// Starts measuring `access`, if there's a tracker.
pub(crate) fn start(
    tracker: Option<&dyn PersistencePerformanceTracker>,
    access: Access,
) -> Option<Token> {
    tracker.map(|tracker| tracker.start(&tracker.make_identifier(access)))
}

/// Stops a measurement started with [`start`].
pub(crate) fn stop(
    tracker: Option<&dyn PersistencePerformanceTracker>,
    token: Option<Token>,
    access: Access,
    outcome: Result<Usage, &PersistenceError>,
) {
    if let (Some(tracker), Some(token)) = (tracker, token) {
        tracker.stop(token, &tracker.make_metadata(access, outcome));
    }
}
