use std::{fmt::Display, future::Future, num::NonZeroUsize, panic::AssertUnwindSafe};

use futures::FutureExt as _;
use tokio::task::JoinSet;
use tracing::error;

use crate::error::Error;

/// Runs labeled tasks concurrently and waits for all of them. A failing or
/// panicking task is logged and reported in its own slot, its siblings keep
/// running. With `capacity` at most that many tasks are in flight.
///
/// Results come back in completion order.
pub async fn join_contained<Iterable, Label, Fut, T>(
    tasks: Iterable,
    capacity: Option<NonZeroUsize>,
) -> Vec<(Label, Result<T, Error>)>
where
    Iterable: IntoIterator<Item = (Label, Fut)>,
    Label: Display + Clone + Send + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    T: Send + 'static,
{
    let mut pending = tasks.into_iter().fuse();
    let mut set = JoinSet::new();
    let mut results = Vec::new();

    let spawn = |set: &mut JoinSet<_>, (label, future): (Label, Fut)| {
        set.spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::TaskError(format!("{} panicked", label))),
            };
            (label, outcome)
        });
    };

    let limit = capacity.map_or(usize::MAX, NonZeroUsize::get);
    for task in (&mut pending).take(limit) {
        spawn(&mut set, task);
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((label, outcome)) => {
                if let Err(e) = &outcome {
                    error!(task = %label, "Task failed: {}", e);
                }
                results.push((label, outcome));
            },
            Err(e) => error!("Task could not be joined: {}", e),
        }

        if let Some(task) = pending.next() {
            spawn(&mut set, task);
        }
    }

    results
}
