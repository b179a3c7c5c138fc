//! Bounded concurrent orchestration over many entities.

use std::future::Future;
use std::sync::Arc;

use qcmp_core::{CompanyResult, EntityReference};
use qcmp_fetch::DocumentFetcher;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::resolver::FundamentalsResolver;

/// Runs `f` over every item with at most `limit` futures in flight and returns
/// the outputs in completion order. A task that panics loses its output; the
/// others are unaffected.
pub async fn bounded_map<T, R, F, Fut>(items: Vec<T>, limit: usize, mut f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let gate = Arc::new(Semaphore::new(limit.max(1)));
    // Sized so no send ever waits on the drain below.
    let (tx, mut rx) = mpsc::channel(items.len().max(1));
    let mut tasks = JoinSet::new();

    for item in items {
        let gate = Arc::clone(&gate);
        let tx = tx.clone();
        let work = f(item);
        tasks.spawn(async move {
            let Ok(_permit) = gate.acquire_owned().await else {
                return;
            };
            let output = work.await;
            if let Err(err) = tx.send(output).await {
                error!(error = %err, "result channel closed");
            }
        });
    }
    drop(tx);

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "task aborted");
        }
    }

    let mut outputs = Vec::new();
    while let Some(output) = rx.recv().await {
        outputs.push(output);
    }
    outputs
}

/// Resolves every entity with at most `limit` resolutions at once. Failed
/// entities are logged and left out; the batch itself never fails.
pub async fn run<F>(
    resolver: Arc<FundamentalsResolver<F>>,
    entities: Vec<EntityReference>,
    limit: usize,
) -> Vec<CompanyResult>
where
    F: DocumentFetcher + 'static,
{
    let requested = entities.len();
    info!(requested, limit, "starting batch");

    let outcomes = bounded_map(entities, limit, |entity| {
        let resolver = Arc::clone(&resolver);
        async move {
            match resolver.resolve(&entity).await {
                Ok(result) => Some(result),
                Err(err) => {
                    warn!(entity = %entity.display_id, error = %err, "resolution failed; entity excluded");
                    None
                }
            }
        }
    })
    .await;

    let results = outcomes.into_iter().flatten().collect::<Vec<_>>();
    info!(requested, resolved = results.len(), "batch finished");
    results
}
