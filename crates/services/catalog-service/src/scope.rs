//! Request-scoped unit of work.
//!
//! The boundary opens one unit of work per request, resolves the caller
//! once and disposes the unit of work on every exit path.

use std::future::Future;
use std::pin::Pin;

use domain::Caller;

use crate::identity::IdentityProvider;
use crate::infra::Database;
use crate::persistence::UnitOfWork;
use common::AppResult;

/// Run `handler` inside a fresh unit of work.
///
/// The handler is responsible for calling `save`; anything left pending when
/// it returns is discarded. If the handler panics or the future is dropped,
/// `UnitOfWork`'s `Drop` releases the context instead.
pub async fn with_unit_of_work<F, T>(
    db: &Database,
    identity: &dyn IdentityProvider,
    handler: F,
) -> AppResult<T>
where
    F: for<'a> FnOnce(
            &'a UnitOfWork,
            &'a Caller,
        ) -> Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>
        + Send,
    T: Send,
{
    let caller = identity.current_caller();
    let uow = db.unit_of_work();
    tracing::debug!(uow = %uow.id(), caller = %caller, "Request scope opened");

    let result = handler(&uow, &caller).await;
    if let Err(err) = &result {
        tracing::warn!(uow = %uow.id(), code = err.code(), "Request failed: {}", err);
    }

    uow.dispose();
    result
}

/// Shorthand for `with_unit_of_work` with an inline async body.
#[macro_export]
macro_rules! with_unit_of_work {
    ($db:expr, $identity:expr, |$uow:ident, $caller:ident| $body:expr) => {
        $crate::with_unit_of_work($db, $identity, |$uow, $caller| {
            Box::pin(async move { $body })
        })
        .await
    };
}
