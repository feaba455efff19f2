use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collection::Collection;
use crate::errors::is_hold_resource;
use crate::filter::{Filter, Filters};
use crate::queue::{Item, ItemState, Queue};
use crate::registry::{self, Registry};
use crate::resource::Resource;
use crate::scanner::Scanner;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct Parameters {
    pub force: bool,
    /// Seconds the confirmation prompt pauses when forced; the engine
    /// refuses to run with less than 3.
    pub force_sleep: u64,
    pub quiet: bool,
    pub no_dry_run: bool,
    pub use_filter_groups: bool,
    pub wait_on_dependencies: bool,
    /// Abort after this many consecutive sweeps with only waiting items.
    /// Zero means wait forever.
    pub max_wait_retries: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            force: false,
            force_sleep: 10,
            quiet: false,
            no_dry_run: false,
            use_filter_groups: true,
            wait_on_dependencies: false,
            max_wait_retries: 0,
        }
    }
}

pub type ValidateHandler = Box<dyn Fn() -> Result<()> + Send + Sync>;
pub type PromptFn = Box<dyn Fn() -> Result<()> + Send + Sync>;

type ListCache = HashMap<String, HashMap<String, Vec<Box<dyn Resource>>>>;

/// The run engine: validates, scans, confirms, and drives every queued item
/// to a terminal state.
pub struct Sweeper {
    pub parameters: Parameters,
    filters: Filters,
    settings: Settings,
    registry: Option<Registry>,
    validate_handlers: Vec<ValidateHandler>,
    resource_types: BTreeMap<String, Collection>,
    scanners: BTreeMap<String, Vec<Scanner>>,
    scanner_fingerprints: HashSet<String>,
    queue: Queue,
    version: String,
    prompt_fn: Option<PromptFn>,
    run_sleep: Duration,
}

impl Sweeper {
    pub fn new(parameters: Parameters, filters: Filters, settings: Settings) -> Self {
        Self {
            parameters,
            filters,
            settings,
            registry: None,
            validate_handlers: Vec::new(),
            resource_types: BTreeMap::new(),
            scanners: BTreeMap::new(),
            scanner_fingerprints: HashSet::new(),
            queue: Queue::new(),
            version: String::new(),
            prompt_fn: None,
            run_sleep: Duration::from_secs(5),
        }
    }

    /// Use an explicit registry instead of the process-wide default.
    pub fn set_registry(&mut self, registry: Registry) {
        self.registry = Some(registry);
    }

    pub fn set_run_sleep(&mut self, run_sleep: Duration) {
        self.run_sleep = run_sleep;
    }

    pub fn register_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn register_validate_handler(&mut self, handler: ValidateHandler) {
        self.validate_handlers.push(handler);
    }

    pub fn register_prompt(&mut self, prompt: PromptFn) {
        self.prompt_fn = Some(prompt);
    }

    /// Enable kinds for a scope; repeated calls accumulate.
    pub fn register_resource_types(&mut self, scope: &str, types: Collection) {
        let entry = self.resource_types.entry(scope.to_string()).or_default();
        *entry = entry.union(&types);
    }

    pub fn resource_types(&self, scope: &str) -> Option<&Collection> {
        self.resource_types.get(scope)
    }

    /// A scanner is identified by its scope, owner, kinds, and options
    /// bundle; registering the same combination twice is an error.
    pub fn register_scanner(&mut self, scope: &str, scanner: Scanner) -> Result<()> {
        let fingerprint = format!("{scope}|{}", scanner.fingerprint());
        if !self.scanner_fingerprints.insert(fingerprint) {
            bail!("a scanner with the same owner, resource types and options is already registered");
        }
        self.scanners.entry(scope.to_string()).or_default().push(scanner);
        Ok(())
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    fn resolve_registry(&self) -> Registry {
        self.registry.clone().unwrap_or_else(registry::global)
    }

    fn log_version(&self) {
        if !self.version.is_empty() {
            info!("Version: {}", self.version);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.parameters.force_sleep < 3 {
            bail!("force-sleep must be at least 3 seconds, got {}", self.parameters.force_sleep);
        }
        self.filters.validate()?;
        for handler in &self.validate_handlers {
            handler()?;
        }
        Ok(())
    }

    pub fn prompt(&self) -> Result<()> {
        match &self.prompt_fn {
            Some(prompt) => prompt(),
            None => Ok(()),
        }
    }

    /// Apply resource-level and configured filters to one item, possibly
    /// moving it to the filtered state. Errors (e.g. an invalid regex) are
    /// fatal to the scan.
    pub fn filter(&self, item: &mut Item) -> Result<()> {
        filter_item(item, &self.filters, self.parameters.use_filter_groups)
    }

    pub async fn scan(&mut self, ctx: &CancellationToken) -> Result<()> {
        let registry = self.resolve_registry();
        self.scan_with(ctx, &registry).await
    }

    async fn scan_with(&mut self, ctx: &CancellationToken, registry: &Registry) -> Result<()> {
        let Self { parameters, filters, settings, scanners, queue, .. } = self;

        for (scope, scoped) in scanners.iter() {
            debug!("scanning scope '{scope}'");
            for scanner in scoped {
                let (tx, mut rx) = mpsc::channel(scanner.queue_size());
                let run = scanner.run(ctx, registry, tx);
                let drain = async {
                    while let Some(mut item) = rx.recv().await {
                        if parameters.wait_on_dependencies && !registry.depends_on(&item.kind).is_empty() {
                            item.state = ItemState::NewDependency;
                        }
                        if let Some(setting) = settings.get(&item.kind) {
                            item.resource.apply_settings(setting);
                        }
                        filter_item(&mut item, filters, parameters.use_filter_groups)?;
                        if item.state == ItemState::Filtered {
                            if !parameters.quiet {
                                item.print_filtered();
                            }
                        } else {
                            item.print();
                        }
                        queue.push(item);
                    }
                    Ok::<(), anyhow::Error>(())
                };

                let (run_result, drain_result) = tokio::join!(run, drain);
                drain_result?;
                run_result?;
            }
        }

        info!(
            "Scan complete: {} total, {} nukeable, {} filtered.",
            self.queue.total(),
            self.queue.count(&[ItemState::New, ItemState::NewDependency]),
            self.queue.count(&[ItemState::Filtered]),
        );
        Ok(())
    }

    /// The full sweep: validate, confirm, scan, confirm again, then drive
    /// the queue until everything is terminal.
    pub async fn run(&mut self, ctx: &CancellationToken) -> Result<()> {
        let registry = self.resolve_registry();

        self.log_version();
        self.validate()?;
        self.prompt()?;
        self.scan_with(ctx, &registry).await?;

        if self.queue.count(&[ItemState::New]) == 0 {
            info!("No resources to delete.");
            return Ok(());
        }

        if !self.parameters.no_dry_run {
            info!("The above resources would be deleted with the supplied configuration. Provide --no-dry-run to actually destroy resources.");
            return Ok(());
        }

        self.prompt()?;
        let result = self.run_loop(ctx, &registry).await;

        info!(
            "Nuke complete: {} failed, {} skipped, {} finished.",
            self.queue.count(&[ItemState::Failed]),
            self.queue.count(&[ItemState::Filtered]),
            self.queue.count(&[ItemState::Finished]),
        );

        result
    }

    async fn run_loop(&mut self, ctx: &CancellationToken, registry: &Registry) -> Result<()> {
        let mut fail_count = 0u32;
        let mut waiting_count = 0u32;

        loop {
            self.handle_queue(ctx, registry).await;

            if self.queue.count(&[
                ItemState::New,
                ItemState::NewDependency,
                ItemState::Pending,
                ItemState::PendingDependency,
                ItemState::Failed,
                ItemState::Waiting,
                ItemState::Hold,
            ]) == 0
            {
                break;
            }

            // Nothing progressable left but failed items remain: give the
            // back-end one more sweep to settle, then abort.
            if self.queue.count(&[ItemState::Failed]) > 0
                && self.queue.count(&[
                    ItemState::New,
                    ItemState::NewDependency,
                    ItemState::Pending,
                    ItemState::PendingDependency,
                    ItemState::Hold,
                    ItemState::Waiting,
                ]) == 0
            {
                fail_count += 1;
                if fail_count >= 2 {
                    error!("There are resources in failed state, but none are ready for deletion, anymore.");
                    for item in self.queue.items().iter().filter(|i| i.state == ItemState::Failed) {
                        error!("{} - {} - {} - {}", item.owner, item.kind, item.name(), item.reason);
                    }
                    bail!("failed");
                }
            } else {
                fail_count = 0;
            }

            if self.queue.count(&[ItemState::Waiting, ItemState::Pending, ItemState::PendingDependency, ItemState::Hold])
                > 0
                && self.queue.count(&[ItemState::New, ItemState::NewDependency]) == 0
            {
                waiting_count += 1;
                if self.parameters.max_wait_retries != 0 && waiting_count >= self.parameters.max_wait_retries {
                    bail!("max wait retries of {} exceeded", self.parameters.max_wait_retries);
                }
            } else {
                waiting_count = 0;
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => bail!("run cancelled"),
                _ = tokio::time::sleep(self.run_sleep) => {}
            }
        }

        Ok(())
    }

    /// One sweep over the queue. The re-list cache lives for exactly one
    /// sweep.
    async fn handle_queue(&mut self, ctx: &CancellationToken, registry: &Registry) {
        let mut cache: ListCache = HashMap::new();

        for index in 0..self.queue.len() {
            let state = self.queue.items()[index].state;
            match state {
                ItemState::New | ItemState::Hold => {
                    let item = &mut self.queue.items_mut()[index];
                    handle_remove(ctx, item).await;
                    item.print();
                }
                ItemState::NewDependency | ItemState::PendingDependency => {
                    self.handle_wait_dependency(ctx, registry, index).await;
                    self.queue.items()[index].print();
                }
                ItemState::Failed => {
                    let item = &mut self.queue.items_mut()[index];
                    handle_remove(ctx, item).await;
                    handle_wait(ctx, registry, item, &mut cache).await;
                    item.print();
                }
                ItemState::Pending => {
                    let item = &mut self.queue.items_mut()[index];
                    item.state = ItemState::Waiting;
                    handle_wait(ctx, registry, item, &mut cache).await;
                }
                ItemState::Waiting => {
                    let item = &mut self.queue.items_mut()[index];
                    handle_wait(ctx, registry, item, &mut cache).await;
                }
                ItemState::Filtered | ItemState::Finished => {}
            }
        }
    }

    /// Count blocking items across the kind's declared dependencies; only
    /// when every dependency has drained is the removal attempted.
    async fn handle_wait_dependency(&mut self, ctx: &CancellationToken, registry: &Registry, index: usize) {
        let kind = self.queue.items()[index].kind.clone();
        let dep_count: usize = registry
            .depends_on(&kind)
            .iter()
            .map(|dep| self.queue.count_by_kind(dep, &ItemState::BLOCKING))
            .sum();

        let item = &mut self.queue.items_mut()[index];
        if dep_count == 0 {
            if let Err(err) = item.resource.handle_wait(ctx).await {
                item.state = ItemState::Failed;
                item.reason = err.to_string();
                return;
            }
            handle_remove(ctx, item).await;
        } else {
            item.state = ItemState::PendingDependency;
            item.reason = format!("left: {dep_count}");
        }
    }
}

async fn handle_remove(ctx: &CancellationToken, item: &mut Item) {
    match item.resource.remove(ctx).await {
        Ok(()) => {
            item.state = ItemState::Pending;
            item.reason.clear();
        }
        Err(err) => {
            item.state = if is_hold_resource(&err) { ItemState::Hold } else { ItemState::Failed };
            item.reason = err.to_string();
        }
    }
}

/// Re-list the item's kind (through the per-sweep cache) and decide whether
/// the resource is actually gone. An element that self-filters on re-list
/// counts as gone.
async fn handle_wait(ctx: &CancellationToken, registry: &Registry, item: &mut Item, cache: &mut ListCache) {
    let owner_cache = cache.entry(item.owner.clone()).or_default();
    if !owner_cache.contains_key(&item.kind) {
        match item.list(ctx, registry).await {
            Ok(listed) => {
                owner_cache.insert(item.kind.clone(), listed);
            }
            Err(err) => {
                item.state = ItemState::Failed;
                item.reason = err.to_string();
                return;
            }
        }
    }

    for other in &owner_cache[&item.kind] {
        if item.equals(other.as_ref()) {
            if other.filter().is_err() {
                break;
            }
            return;
        }
    }

    item.state = ItemState::Finished;
    item.reason.clear();
}

fn filter_item(item: &mut Item, filters: &Filters, use_groups: bool) -> Result<()> {
    if let Err(reason) = item.resource.filter() {
        item.state = ItemState::Filtered;
        item.reason = reason.to_string();
        return Ok(());
    }

    let groups = filters.get_by_group(&item.kind);
    if groups.is_empty() {
        return Ok(());
    }

    // Every filter is evaluated so that a broken filter surfaces no matter
    // which group it sits in or what matched before it.
    let mut first_match: Option<String> = None;
    let mut any_match = false;
    let mut all_groups_satisfied = true;
    for group_filters in groups.values() {
        let mut hits = 0usize;
        for filter in group_filters {
            if eval_filter(filter, item)? {
                hits += 1;
                any_match = true;
                if first_match.is_none() {
                    first_match = Some(filter.to_string());
                }
            }
        }
        if hits == 0 {
            all_groups_satisfied = false;
        }
    }

    let filtered = if use_groups { all_groups_satisfied } else { any_match };
    if filtered {
        item.state = ItemState::Filtered;
        item.reason = first_match.unwrap_or_else(|| "filtered".to_string());
    }
    Ok(())
}

fn eval_filter(filter: &Filter, item: &Item) -> Result<bool> {
    let value = match item.get_property(&filter.property) {
        Ok(value) => value,
        Err(err) => {
            // Resources without property support simply never match; the
            // remaining filters still run.
            warn!("skipping filter: {err}");
            return Ok(false);
        }
    };
    let matched = filter.match_value(&value)?;
    Ok(matched != filter.invert)
}
