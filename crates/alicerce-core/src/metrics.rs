//! Performance metrics tracking.
//!
//! Trackers time arbitrary blocks of work identified by a string. The
//! orchestration layer uses them to time payload decoding; a tracker is
//! always optional and must never change the result of the work it measures.
//!
//! # Examples
//!
//! ```rust
//! use alicerce_core::metrics::{MeasureExt, Metadata, TracingPerformanceTracker};
//!
//! let tracker = TracingPerformanceTracker::new();
//!
//! let parsed: Result<u32, std::num::ParseIntError> =
//!     tracker.measure("parse", &Metadata::new(), || "42".parse());
//!
//! assert_eq!(parsed, Ok(42));
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Metadata attached to a measurement.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key for the decoded model's type name.
pub const MODEL_TYPE_KEY: &str = "model_type";

/// Metadata key for the decoded payload's size in bytes.
pub const PAYLOAD_SIZE_KEY: &str = "payload_size";

/// A started measurement.
#[derive(Debug, Clone)]
pub struct Token {
    identifier: String,
    started_at: Instant,
}

impl Token {
    /// Starts a measurement now.
    pub fn start(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            started_at: Instant::now(),
        }
    }

    /// The measured block's identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Time elapsed since the measurement started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// A performance metrics tracker.
pub trait PerformanceMetricsTracker: Send + Sync {
    /// Starts measuring the block identified by `identifier`.
    fn start(&self, identifier: &str) -> Token;

    /// Stops a measurement, attaching `metadata` to it.
    fn stop(&self, token: Token, metadata: &Metadata);
}

/// A tracker that knows how to describe decode measurements.
pub trait DecodePerformanceTracker: PerformanceMetricsTracker {
    /// The identifier of a decode measurement for a model type.
    fn make_decode_identifier(&self, model_type: &str) -> String {
        format!("Decode {model_type}")
    }

    /// The metadata of a decode measurement.
    fn make_decode_metadata(&self, model_type: &str, payload_size: usize) -> Metadata {
        Metadata::from([
            (MODEL_TYPE_KEY.to_string(), model_type.to_string()),
            (PAYLOAD_SIZE_KEY.to_string(), payload_size.to_string()),
        ])
    }
}

/// Measuring helpers, available on every tracker (including trait objects).
pub trait MeasureExt: PerformanceMetricsTracker {
    /// Measures `execute`, returning its result unchanged.
    ///
    /// The measurement is stopped whether `execute` succeeds or fails.
    fn measure<T, E, F>(&self, identifier: &str, metadata: &Metadata, execute: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let token = self.start(identifier);
        let result = execute();
        self.stop(token, metadata);
        result
    }

    /// Measures the decoding of a `payload_size` bytes payload into a `T`.
    fn measure_decode<T, E, F>(&self, payload_size: usize, execute: F) -> Result<T, E>
    where
        Self: DecodePerformanceTracker,
        F: FnOnce() -> Result<T, E>,
    {
        let model_type = std::any::type_name::<T>();
        let identifier = self.make_decode_identifier(model_type);
        let metadata = self.make_decode_metadata(model_type, payload_size);

        self.measure(&identifier, &metadata, execute)
    }
}

impl<T: PerformanceMetricsTracker + ?Sized> MeasureExt for T {}

/// A tracker that reports measurements as `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPerformanceTracker;

impl TracingPerformanceTracker {
    /// Creates a tracker.
    pub fn new() -> Self {
        Self
    }
}

impl PerformanceMetricsTracker for TracingPerformanceTracker {
    fn start(&self, identifier: &str) -> Token {
        Token::start(identifier)
    }

    fn stop(&self, token: Token, metadata: &Metadata) {
        debug!(
            identifier = %token.identifier(),
            elapsed_us = token.elapsed().as_micros() as u64,
            metadata = ?metadata,
            "Measured"
        );
    }
}

impl DecodePerformanceTracker for TracingPerformanceTracker {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        started: Mutex<Vec<String>>,
        stopped: Mutex<Vec<(String, Metadata)>>,
    }

    impl PerformanceMetricsTracker for RecordingTracker {
        fn start(&self, identifier: &str) -> Token {
            self.started.lock().unwrap().push(identifier.to_string());
            Token::start(identifier)
        }

        fn stop(&self, token: Token, metadata: &Metadata) {
            self.stopped
                .lock()
                .unwrap()
                .push((token.identifier().to_string(), metadata.clone()));
        }
    }

    impl DecodePerformanceTracker for RecordingTracker {}

    #[test]
    fn test_measure_is_transparent() {
        let tracker = RecordingTracker::default();

        let ok: Result<u8, String> = tracker.measure("ok", &Metadata::new(), || Ok(7));
        let err: Result<u8, String> =
            tracker.measure("err", &Metadata::new(), || Err("boom".to_string()));

        assert_eq!(ok, Ok(7));
        assert_eq!(err, Err("boom".to_string()));
        assert_eq!(*tracker.started.lock().unwrap(), vec!["ok", "err"]);
        assert_eq!(tracker.stopped.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_measure_decode_metadata() {
        let tracker = RecordingTracker::default();

        let value: Result<u64, ()> = tracker.measure_decode(128, || Ok(1));

        assert_eq!(value, Ok(1));
        let stopped = tracker.stopped.lock().unwrap();
        let (identifier, metadata) = &stopped[0];
        assert_eq!(identifier, "Decode u64");
        assert_eq!(metadata.get(MODEL_TYPE_KEY).map(String::as_str), Some("u64"));
        assert_eq!(metadata.get(PAYLOAD_SIZE_KEY).map(String::as_str), Some("128"));
    }

    #[test]
    fn test_measure_through_trait_object() {
        let tracker: Box<dyn DecodePerformanceTracker> = Box::new(RecordingTracker::default());

        let value: Result<&str, ()> = tracker.measure_decode(2, || Ok("ok"));

        assert_eq!(value, Ok("ok"));
    }
}
