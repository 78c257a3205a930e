use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed dispatch identifier backed by ULID.
///
/// Generated once per dispatch and only used to correlate log lines emitted by the gateway,
/// the dispatch task and the backend for the same request.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct DispatchId(pub ulid::Ulid);

impl DispatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DispatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DispatchId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(DispatchId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_id_round_trips_through_display() {
        let id = DispatchId::new();
        let parsed: DispatchId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_dispatch_ids_are_unique() {
        assert_ne!(DispatchId::new(), DispatchId::new());
    }
}
