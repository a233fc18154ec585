//! Runtime side of [`AsyncContextDefinition`](crate::model::async_context::AsyncContextDefinition):
//! a cooperative, ambient binding table keyed by context id.
//!
//! Backed by a single `tokio::task_local!` slot so a binding survives
//! `.await` points under Tokio's work-stealing scheduler. Because a context
//! id isn't known at compile time, the slot holds the whole binding table
//! rather than one slot per context - `provide` clones the table, inserts its
//! own id, and scopes the clone; `use_value` reads back through the active
//! table. The table itself is `Arc`-shared, so capturing a [`Snapshot`] to
//! replay ambient bindings into deferred work (a timer firing, a hook running
//! later than the code that registered it) is a cheap clone.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::model::id::Id;

#[derive(Debug, Error)]
pub enum AsyncContextError {
    #[error("async context `{0}` has no value provided in the current dynamic extent")]
    NotProvided(Id),

    #[error("async context `{0}` was provided a value of a different type than requested")]
    TypeMismatch(Id),
}

impl AsyncContextError {
    pub const fn is_transient(&self) -> bool {
        false
    }
}

type Table = Arc<HashMap<Id, Arc<dyn Any + Send + Sync>>>;

tokio::task_local! {
    static TABLE: Table;
}

fn current_table() -> Table {
    TABLE.try_with(Arc::clone).unwrap_or_default()
}

/// A handle for one `AsyncContext` node, obtained by id.
#[derive(Debug, Clone)]
pub struct AsyncContextHandle {
    id: Id,
}

impl AsyncContextHandle {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Binds `value` under this context's id for the dynamic extent of `f`,
    /// unbinding (restoring whatever was bound before, including nothing) on
    /// every exit path - return, suspension, or error.
    pub async fn provide<T, F, Fut, R>(&self, value: T, f: F) -> R
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let mut table = (*current_table()).clone();
        table.insert(self.id.clone(), Arc::new(value));
        TABLE.scope(Arc::new(table), f()).await
    }

    /// Reads the value bound under this context's id in the calling dynamic
    /// extent. Fails if nothing is currently provided, or if the bound value
    /// isn't a `T`.
    pub fn use_value<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, AsyncContextError> {
        let table = current_table();
        let value = table.get(&self.id).ok_or_else(|| AsyncContextError::NotProvided(self.id.clone()))?;
        value.clone().downcast::<T>().map_err(|_| AsyncContextError::TypeMismatch(self.id.clone()))
    }
}

/// A captured copy of the full ambient binding table, for replaying the
/// context of the code that scheduled deferred work (a timer, a queued hook)
/// into the code that eventually runs it.
#[derive(Clone)]
pub struct Snapshot(Table);

/// Captures every binding currently in scope.
pub fn snapshot() -> Snapshot {
    Snapshot(current_table())
}

impl Snapshot {
    /// Runs `f` with this snapshot's bindings active, regardless of what (if
    /// anything) is bound in the calling task.
    pub async fn restore<F, Fut, R>(self, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        TABLE.scope(self.0, f()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provide_is_visible_inside_and_gone_outside() {
        let ctx = AsyncContextHandle::new("tenant");
        let seen = ctx
            .provide(42u32, || async {
                let value = ctx.use_value::<u32>().unwrap();
                *value
            })
            .await;
        assert_eq!(seen, 42);
        assert!(ctx.use_value::<u32>().is_err());
    }

    #[tokio::test]
    async fn nested_provide_shadows_and_restores() {
        let ctx = AsyncContextHandle::new("tenant");
        ctx.provide(1u32, || async {
            assert_eq!(*ctx.use_value::<u32>().unwrap(), 1);
            ctx.provide(2u32, || async {
                assert_eq!(*ctx.use_value::<u32>().unwrap(), 2);
            })
            .await;
            assert_eq!(*ctx.use_value::<u32>().unwrap(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn wrong_type_is_a_mismatch_not_a_panic() {
        let ctx = AsyncContextHandle::new("tenant");
        ctx.provide(42u32, || async {
            assert!(matches!(ctx.use_value::<String>(), Err(AsyncContextError::TypeMismatch(_))));
        })
        .await;
    }

    #[tokio::test]
    async fn snapshot_replays_bindings_into_unrelated_task() {
        let ctx = AsyncContextHandle::new("trace");
        let snap = ctx.provide(7u32, || async { snapshot() }).await;
        assert!(ctx.use_value::<u32>().is_err());

        let value = snap.restore(|| async { *ctx.use_value::<u32>().unwrap() }).await;
        assert_eq!(value, 7);
    }
}
