//! Caller identity used for audit stamping.

use domain::Caller;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Source of the current caller's identity.
///
/// Queried once per unit of work by the request boundary; the result is
/// passed explicitly to every insert, update and delete.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait IdentityProvider: Send + Sync {
    fn current_caller(&self) -> Caller;
}

/// Identity provider that always reports the same caller.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    caller: Caller,
}

impl StaticIdentity {
    pub fn new(caller: Caller) -> Self {
        Self { caller }
    }

    /// Provider reporting the built-in system caller
    pub fn system() -> Self {
        Self::new(Caller::system())
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_caller(&self) -> Caller {
        self.caller.clone()
    }
}
