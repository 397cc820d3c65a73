//! Fetched values, tagged with where they came from.

/// A successfully fetched value.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchValue<T, R> {
    /// Decoded from a network payload, with the response that carried it.
    Network(T, R),

    /// Decoded from a persisted payload.
    Persistence(T),
}

impl<T, R> FetchValue<T, R> {
    /// The value, regardless of its origin.
    pub fn value(&self) -> &T {
        match self {
            Self::Network(value, _) | Self::Persistence(value) => value,
        }
    }

    /// Consumes the fetch value, returning the value regardless of its origin.
    pub fn into_value(self) -> T {
        match self {
            Self::Network(value, _) | Self::Persistence(value) => value,
        }
    }

    /// The network response, if the value came from the network.
    pub fn response(&self) -> Option<&R> {
        match self {
            Self::Network(_, response) => Some(response),
            Self::Persistence(_) => None,
        }
    }

    /// Whether the value came from the network.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(..))
    }

    /// Maps the value, keeping its origin.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchValue<U, R> {
        match self {
            Self::Network(value, response) => FetchValue::Network(f(value), response),
            Self::Persistence(value) => FetchValue::Persistence(f(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_projects_both_origins() {
        let network: FetchValue<i32, u16> = FetchValue::Network(1, 200);
        let persistence: FetchValue<i32, u16> = FetchValue::Persistence(2);

        assert_eq!(*network.value(), 1);
        assert_eq!(network.response(), Some(&200));
        assert_eq!(persistence.clone().into_value(), 2);
        assert_eq!(persistence.response(), None);
        assert_eq!(network.map(|v| v * 10), FetchValue::Network(10, 200));
    }
}
