use crate::attack::Attack;
use crate::models::{Endpoint, PoolSummary};
use crate::network::{expand, Resolve};
use crate::report::{classify, Report};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Expands every target onto the queue in order, then closes it by
/// dropping the only sender. Returns how many targets failed to expand.
async fn enqueue_targets(
    targets: Vec<String>,
    resolver: Arc<dyn Resolve>,
    reporter: Arc<dyn Report>,
    tx: mpsc::Sender<Endpoint>,
) -> usize {
    let mut unresolved = 0;

    for target in targets {
        let endpoints = match expand(&target, resolver.as_ref()).await {
            Ok(endpoints) => endpoints,
            Err(error) => {
                reporter.unresolved(&target, &error);
                unresolved += 1;
                continue;
            }
        };

        for endpoint in endpoints {
            if tx.send(endpoint).await.is_err() {
                // Every worker is gone; nothing left to feed.
                return unresolved;
            }
        }
    }

    unresolved
}

/// Runs `pool_size` workers over every endpoint the targets expand to and
/// returns once the queue is closed and every worker has exited. A size of
/// zero still gets one worker.
pub async fn spray(
    pool_size: usize,
    targets: Vec<String>,
    resolver: Arc<dyn Resolve>,
    attacker: Arc<dyn Attack>,
    reporter: Arc<dyn Report>,
) -> PoolSummary {
    let worker_count = pool_size.max(1);
    let (tx, rx) = mpsc::channel::<Endpoint>(worker_count);
    let rx = Arc::new(Mutex::new(rx));

    let mut workers = FuturesUnordered::new();
    for id in 0..worker_count {
        let rx = Arc::clone(&rx);
        let attacker = Arc::clone(&attacker);
        let reporter = Arc::clone(&reporter);

        workers.push(tokio::spawn(async move {
            let mut summary = PoolSummary::default();
            loop {
                // Hold the lock only while waiting for the next endpoint.
                let next = rx.lock().await.recv().await;
                let Some(endpoint) = next else {
                    break;
                };

                let result = attacker.attack(endpoint).await;
                let record = classify(&result);
                reporter.record(&record);
                summary.add(record.outcome);
            }
            debug!("worker {id} drained");
            summary
        }));
    }
    // Workers hold the only receivers from here on.
    drop(rx);

    let producer = tokio::spawn(enqueue_targets(
        targets,
        resolver,
        Arc::clone(&reporter),
        tx,
    ));

    let mut total = PoolSummary::default();
    while let Some(joined) = workers.next().await {
        match joined {
            Ok(summary) => {
                total.attacked += summary.attacked;
                total.succeeded += summary.succeeded;
                total.errored += summary.errored;
                total.failed += summary.failed;
            }
            Err(error) => warn!("[!] Worker aborted: {error}"),
        }
    }

    match producer.await {
        Ok(unresolved) => total.unresolved = unresolved,
        Err(error) => warn!("[!] Target producer aborted: {error}"),
    }

    total
}
