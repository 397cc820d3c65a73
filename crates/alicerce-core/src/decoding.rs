//! Payload decoding closures.
//!
//! Resources carry their decoding logic as values rather than trait impls,
//! so the same model type can be decoded differently by different resources.
//! [`ModelDecoding`] turns a raw payload into a model; [`ErrorDecoding`]
//! recovers a domain error (typically an API error body) from a failed
//! response.

use crate::error::{BoxError, DecodeError};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

type DecodeFn<T, P, M> = dyn Fn(&P, &M) -> Result<T, BoxError> + Send + Sync;
type ErrorDecodeFn<E, P, M> = dyn Fn(Option<&P>, &M) -> Option<E> + Send + Sync;

/// Decodes a payload of type `P` into a model `T`, given response metadata `M`.
///
/// # Examples
///
/// ```rust
/// use alicerce_core::decoding::ModelDecoding;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, PartialEq)]
/// struct Item {
///     data: String,
/// }
///
/// let decoding = ModelDecoding::<Item, Vec<u8>>::json();
/// let item = decoding.decode(&br#"{"data":"x"}"#.to_vec(), &()).unwrap();
///
/// assert_eq!(item, Item { data: "x".to_string() });
/// assert!(decoding.decode(&b"not json".to_vec(), &()).is_err());
/// ```
pub struct ModelDecoding<T, P, M = ()> {
    decode: Arc<DecodeFn<T, P, M>>,
}

impl<T, P, M> ModelDecoding<T, P, M> {
    /// Creates a decoding from a fallible closure.
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&P, &M) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
        }
    }

    /// Creates a decoding that can't fail.
    pub fn infallible<F>(decode: F) -> Self
    where
        F: Fn(&P, &M) -> T + Send + Sync + 'static,
    {
        Self::new(move |payload, metadata| Ok(decode(payload, metadata)))
    }

    /// Decodes a payload.
    pub fn decode(&self, payload: &P, metadata: &M) -> Result<T, BoxError> {
        (self.decode)(payload, metadata)
    }
}

impl<T, P, M> ModelDecoding<T, P, M>
where
    T: DeserializeOwned,
    P: AsRef<[u8]>,
{
    /// Creates a decoding that parses the payload bytes as JSON.
    ///
    /// Empty payloads fail with [`DecodeError::EmptyPayload`].
    pub fn json() -> Self {
        Self::new(|payload: &P, _: &M| {
            let bytes = payload.as_ref();
            if bytes.is_empty() {
                return Err(DecodeError::EmptyPayload.into());
            }

            serde_json::from_slice(bytes).map_err(|e| DecodeError::from(e).into())
        })
    }
}

impl<T, P, M> Clone for ModelDecoding<T, P, M> {
    fn clone(&self) -> Self {
        Self {
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T, P, M> fmt::Debug for ModelDecoding<T, P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDecoding")
            .field("model", &std::any::type_name::<T>())
            .finish()
    }
}

/// Recovers a domain error `E` from an optional payload `P` and response metadata `M`.
///
/// Returning `None` means no domain error could be extracted, and the
/// caller should surface the original failure instead.
pub struct ErrorDecoding<E, P, M> {
    decode: Arc<ErrorDecodeFn<E, P, M>>,
}

impl<E, P, M> ErrorDecoding<E, P, M> {
    /// Creates an error decoding from a closure.
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(Option<&P>, &M) -> Option<E> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
        }
    }

    /// An error decoding that never extracts an error.
    pub fn none() -> Self {
        Self::new(|_, _| None)
    }

    /// Attempts to decode a domain error.
    pub fn decode(&self, payload: Option<&P>, metadata: &M) -> Option<E> {
        (self.decode)(payload, metadata)
    }
}

impl<E, P, M> ErrorDecoding<E, P, M>
where
    E: DeserializeOwned,
    P: AsRef<[u8]>,
{
    /// An error decoding that parses the payload as a JSON error body.
    ///
    /// A missing or unparseable payload yields `None`.
    pub fn json() -> Self {
        Self::new(|payload: Option<&P>, _: &M| {
            payload.and_then(|payload| serde_json::from_slice(payload.as_ref()).ok())
        })
    }
}

impl<E, P, M> Clone for ErrorDecoding<E, P, M> {
    fn clone(&self) -> Self {
        Self {
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<E, P, M> Default for ErrorDecoding<E, P, M> {
    fn default() -> Self {
        Self::none()
    }
}

impl<E, P, M> fmt::Debug for ErrorDecoding<E, P, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorDecoding")
            .field("error", &std::any::type_name::<E>())
            .finish()
    }
}
