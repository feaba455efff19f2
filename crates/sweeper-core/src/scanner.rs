use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::{is_skip_request, is_unknown_endpoint};
use crate::queue::Item;
use crate::registry::Registry;
use crate::resource::{Lister, Opts, Resource};

pub const DEFAULT_QUEUE_SIZE: usize = 50_000;
pub const DEFAULT_PARALLEL_QUERIES: usize = 16;

/// Rewrites the options bundle per resource kind before its lister runs,
/// e.g. to pin a region or narrow credentials.
pub type MutateOptsFn = Arc<dyn Fn(&Opts, &str) -> Opts + Send + Sync>;

/// Fans out over the listers of its resource kinds with bounded concurrency
/// and publishes everything discovered into an item channel.
pub struct Scanner {
    owner: String,
    resource_types: Vec<String>,
    opts: Opts,
    mutate_opts: Option<MutateOptsFn>,
    queue_size: usize,
    parallel_queries: usize,
}

impl Scanner {
    pub fn new(owner: impl Into<String>, resource_types: Vec<String>, opts: Opts) -> Self {
        Self {
            owner: owner.into(),
            resource_types,
            opts,
            mutate_opts: None,
            queue_size: DEFAULT_QUEUE_SIZE,
            parallel_queries: DEFAULT_PARALLEL_QUERIES,
        }
    }

    /// At most one mutate-opts hook per scanner.
    pub fn register_mutate_opts_fn(&mut self, f: MutateOptsFn) -> Result<()> {
        if self.mutate_opts.is_some() {
            bail!("a mutate opts function is already registered");
        }
        self.mutate_opts = Some(f);
        Ok(())
    }

    pub fn set_parallel_queries(&mut self, parallel_queries: usize) {
        self.parallel_queries = parallel_queries.max(1);
    }

    pub fn set_queue_size(&mut self, queue_size: usize) {
        self.queue_size = queue_size.max(1);
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn resource_types(&self) -> &[String] {
        &self.resource_types
    }

    /// Identity used to reject duplicate scanner registrations: same owner,
    /// kinds, and options bundle.
    pub fn fingerprint(&self) -> String {
        format!("{}|{:?}|{:?}", self.owner, self.resource_types, self.opts)
    }

    /// Invoke every kind's lister, at most `parallel_queries` in flight, and
    /// push discovered items into `items`. The channel closes once every
    /// lister has retired. A cancelled context aborts the fan-out with an
    /// error; a panicking lister is contained and only logged.
    pub async fn run(&self, ctx: &CancellationToken, registry: &Registry, items: mpsc::Sender<Item>) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.parallel_queries));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for kind in &self.resource_types {
            let permit = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    tasks.shutdown().await;
                    bail!("scan cancelled");
                }
                permit = semaphore.clone().acquire_owned() => permit?,
            };

            let Some(registration) = registry.get_registration(kind) else {
                error!("no lister registered for resource type '{kind}'");
                drop(permit);
                continue;
            };

            let lister = registration.lister.clone();
            let opts = match &self.mutate_opts {
                Some(mutate) => mutate(&self.opts, kind),
                None => self.opts.clone(),
            };
            let owner = self.owner.clone();
            let kind = kind.clone();
            let ctx = ctx.clone();
            let items = items.clone();

            tasks.spawn(async move {
                let _permit = permit;
                list_kind(&ctx, &owner, &kind, lister.as_ref(), opts, items).await;
            });
        }

        // The original sender is dropped here; the channel closes once the
        // last task's clone goes with it.
        drop(items);

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    error!("lister panicked: {}", panic_message(err.into_panic()));
                }
            }
        }

        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

async fn list_kind(
    ctx: &CancellationToken,
    owner: &str,
    kind: &str,
    lister: &dyn Lister,
    opts: Opts,
    items: mpsc::Sender<Item>,
) {
    let resources = match lister.list(ctx, &opts).await {
        Ok(resources) => resources,
        Err(err) => {
            if is_skip_request(&err) || is_unknown_endpoint(&err) {
                debug!("skipping request for resource type '{kind}': {err}");
            } else {
                error!("listing '{kind}' failed:\n    {err:#}");
            }
            return;
        }
    };

    for mut resource in resources {
        resource.before_enqueue();
        let item = Item::new(resource, kind, owner, opts.clone());
        match items.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("item queue is full, not all resources will be enqueued");
                break;
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
}

#[cfg(test)]
mod tests;
