use std::fmt;

use anyhow::{anyhow, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::Registry;
use crate::resource::{Opts, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    New,
    NewDependency,
    Pending,
    PendingDependency,
    Waiting,
    Hold,
    Failed,
    Filtered,
    Finished,
}

impl ItemState {
    /// States in which an item still occupies its kind, blocking dependents.
    pub const BLOCKING: [ItemState; 6] = [
        ItemState::New,
        ItemState::NewDependency,
        ItemState::Pending,
        ItemState::PendingDependency,
        ItemState::Waiting,
        ItemState::Hold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::NewDependency => "new-dependency",
            Self::Pending => "pending",
            Self::PendingDependency => "pending-dependency",
            Self::Waiting => "waiting",
            Self::Hold => "hold",
            Self::Failed => "failed",
            Self::Filtered => "filtered",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work: a discovered resource and where it sits in its
/// lifecycle.
pub struct Item {
    pub resource: Box<dyn Resource>,
    pub state: ItemState,
    /// Human-readable explanation of the current state: last error, filter
    /// that matched, dependency count.
    pub reason: String,
    pub kind: String,
    pub owner: String,
    pub opts: Opts,
}

impl Item {
    pub fn new(resource: Box<dyn Resource>, kind: impl Into<String>, owner: impl Into<String>, opts: Opts) -> Self {
        Self { resource, state: ItemState::New, reason: String::new(), kind: kind.into(), owner: owner.into(), opts }
    }

    /// Whether `other` is the same underlying resource as this item's.
    ///
    /// The comparison walks from the most specific identity a resource
    /// exposes to the most general: unique key, non-repeatable properties,
    /// legacy identifier, full property map. Resources exposing none of
    /// these never compare equal.
    pub fn equals(&self, other: &dyn Resource) -> bool {
        if self.resource.as_any().type_id() != other.as_any().type_id() {
            return false;
        }

        match (self.resource.unique_key(), other.unique_key()) {
            (Some(a), Some(b)) => return a == b,
            (None, None) => {}
            _ => return false,
        }

        match (self.resource.unique_properties(), other.unique_properties()) {
            (Some(a), Some(b)) => return a == b,
            (None, None) => {}
            _ => return false,
        }

        match (self.resource.display_name(), other.display_name()) {
            (Some(a), Some(b)) => return a == b,
            (None, None) => {}
            _ => return false,
        }

        match (self.resource.properties(), other.properties()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Fetch a property value for the filter engine. An empty property name
    /// asks for the legacy identifier.
    pub fn get_property(&self, name: &str) -> Result<String> {
        if name.is_empty() {
            self.resource
                .display_name()
                .ok_or_else(|| anyhow!("resource type '{}' does not support legacy identifiers", self.kind))
        } else {
            match self.resource.properties() {
                Some(props) => Ok(props.get(name).unwrap_or_default().to_string()),
                None => Err(anyhow!("resource type '{}' does not support custom properties", self.kind)),
            }
        }
    }

    /// Re-list this item's kind through the registry, for the post-remove
    /// wait probe.
    pub async fn list(&self, ctx: &CancellationToken, registry: &Registry) -> Result<Vec<Box<dyn Resource>>> {
        let registration = registry
            .get_registration(&self.kind)
            .ok_or_else(|| anyhow!("no lister registered for resource type '{}'", self.kind))?;
        registration.lister.list(ctx, &self.opts).await
    }

    /// Best display identity for logs.
    pub fn name(&self) -> String {
        self.resource
            .display_name()
            .or_else(|| self.resource.unique_key())
            .or_else(|| self.resource.properties().map(|p| p.to_string()))
            .unwrap_or_else(|| "<unidentified>".to_string())
    }

    pub fn print(&self) {
        if self.reason.is_empty() {
            info!("{} - {} - {} - {}", self.owner, self.kind, self.name(), self.state);
        } else {
            info!("{} - {} - {} - {} ({})", self.owner, self.kind, self.name(), self.state, self.reason);
        }
    }

    pub fn print_filtered(&self) {
        debug!("{} - {} - {} - filtered ({})", self.owner, self.kind, self.name(), self.reason);
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("name", &self.name())
            .field("state", &self.state)
            .field("reason", &self.reason)
            .finish()
    }
}

/// Insertion-ordered container of work items.
#[derive(Debug, Default)]
pub struct Queue {
    items: Vec<Item>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn count(&self, states: &[ItemState]) -> usize {
        self.items.iter().filter(|i| states.contains(&i.state)).count()
    }

    pub fn count_by_kind(&self, kind: &str, states: &[ItemState]) -> usize {
        self.items.iter().filter(|i| i.kind == kind && states.contains(&i.state)).count()
    }
}
