//! Sync-context guard.
//!
//! Writes that originate from the sync engine (webhook events, bulk sync)
//! run inside a task-scoped marker. Lifecycle operations check the marker at
//! entry and skip their remote call when it is set, which is what breaks the
//! feedback loop between the remote→local and local→remote paths.
//!
//! The marker is a `tokio::task_local!`, so it propagates across every
//! `.await` inside the scoped future and is invisible to concurrent,
//! unrelated tasks. It does not cross `tokio::spawn` boundaries; the sync
//! engine awaits its writes inline for exactly that reason.

use std::future::Future;

tokio::task_local! {
    static SYNC_CONTEXT: ();
}

/// Run a future with the sync-context marker set.
pub async fn run_with_sync_context<F>(fut: F) -> F::Output
where
    F: Future,
{
    SYNC_CONTEXT.scope((), fut).await
}

/// Check whether the current task is executing inside a sync context.
#[must_use]
pub fn is_running_in_sync_context() -> bool {
    SYNC_CONTEXT.try_with(|_| ()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_marker_set_inside_scope_only() {
        assert!(!is_running_in_sync_context());

        run_with_sync_context(async {
            assert!(is_running_in_sync_context());
        })
        .await;

        assert!(!is_running_in_sync_context());
    }

    #[tokio::test]
    async fn test_marker_survives_nested_awaits() {
        async fn inner_level_two() -> bool {
            tokio::task::yield_now().await;
            is_running_in_sync_context()
        }

        async fn inner_level_one() -> bool {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            inner_level_two().await
        }

        let seen = run_with_sync_context(inner_level_one()).await;
        assert!(seen);
    }

    #[tokio::test]
    async fn test_concurrent_tasks_do_not_observe_each_other() {
        let guarded = tokio::spawn(run_with_sync_context(async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            is_running_in_sync_context()
        }));

        let unguarded = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            is_running_in_sync_context()
        });

        assert!(guarded.await.unwrap());
        assert!(!unguarded.await.unwrap());
    }

    #[tokio::test]
    async fn test_nested_scopes_are_harmless() {
        run_with_sync_context(async {
            assert!(is_running_in_sync_context());
            run_with_sync_context(async {
                assert!(is_running_in_sync_context());
            })
            .await;
            assert!(is_running_in_sync_context());
        })
        .await;
    }
}
