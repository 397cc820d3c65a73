/// Defines an error boundary as a `From` implementation.
///
/// # Syntax
///
/// ```ignore
/// error_boundary!(SourceError => TargetError, |err_var| {
///     // conversion logic returning TargetError
/// });
/// ```
///
/// # Example
///
/// ```
/// use alicerce_core::error_boundary;
/// use std::io;
///
/// #[derive(Debug, thiserror::Error)]
/// enum StoreError {
///     #[error("io: {0}")]
///     Io(String),
///     #[error("json: {0}")]
///     Json(String),
/// }
///
/// error_boundary!(io::Error => StoreError, |e| {
///     StoreError::Io(e.to_string())
/// });
///
/// error_boundary!(serde_json::Error => StoreError, |e| {
///     StoreError::Json(e.to_string())
/// });
///
/// fn load(path: &str) -> Result<serde_json::Value, StoreError> {
///     let content = std::fs::read_to_string(path)?;
///     let json = serde_json::from_str(&content)?;
///     Ok(json)
/// }
///
/// assert!(matches!(load("/nonexistent/entry.json"), Err(StoreError::Io(_))));
/// ```
#[macro_export]
macro_rules! error_boundary {
    ($inner:ty => $outer:ty, |$err:ident| $body:expr) => {
        impl ::std::convert::From<$inner> for $outer {
            fn from($err: $inner) -> $outer {
                $body
            }
        }
    };
}
