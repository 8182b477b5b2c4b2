//! Caller identity used for audit stamping.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CALLER_LENGTH, SYSTEM_CALLER};
use crate::error::{DomainError, DomainResult};

/// The identity performing a request.
///
/// Passed explicitly into every write so audit stamping never depends on
/// process-wide state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Caller(String);

impl Caller {
    /// Create a caller identity, rejecting blank or oversized names.
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(DomainError::validation("Caller identity must not be empty"));
        }
        if trimmed.len() > MAX_CALLER_LENGTH {
            return Err(DomainError::validation(format!(
                "Caller identity must be at most {} characters",
                MAX_CALLER_LENGTH
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Identity used by maintenance tooling and background work
    pub fn system() -> Self {
        Self(SYSTEM_CALLER.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Caller {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Caller::new(value)
    }
}

impl From<Caller> for String {
    fn from(caller: Caller) -> Self {
        caller.0
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_whitespace() {
        let caller = Caller::new("  alice ").unwrap();
        assert_eq!(caller.name(), "alice");
    }

    #[test]
    fn test_new_rejects_blank() {
        assert!(matches!(Caller::new("   "), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_new_rejects_oversized() {
        let long = "x".repeat(MAX_CALLER_LENGTH + 1);
        assert!(Caller::new(long).is_err());
    }

    #[test]
    fn test_system_caller() {
        assert_eq!(Caller::system().to_string(), SYSTEM_CALLER);
    }
}
