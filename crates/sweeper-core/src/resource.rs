use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::properties::Properties;
use crate::settings::Setting;

pub const DEFAULT_SCOPE: &str = "default";

/// One resource instance discovered by a lister.
///
/// `remove` is the only required operation; everything else is an optional
/// capability with a neutral default. The engine picks the most specific
/// identity a resource exposes when comparing instances across re-lists:
/// `unique_key`, then `unique_properties`, then `display_name`, then the
/// full `properties` map.
#[async_trait]
pub trait Resource: Any + Send + Sync {
    /// Ask the back-end to delete this resource. Returning a
    /// `ResourceError::HoldResource` puts the item on hold for retry every
    /// sweep; any other error marks it failed.
    async fn remove(&self, ctx: &CancellationToken) -> Result<()>;

    /// Self-filtering: an `Err` drops the item from the sweep with the
    /// error text as the reason. Never fatal to the run.
    fn filter(&self) -> Result<()> {
        Ok(())
    }

    /// Legacy identifier; also serves property lookups with an empty
    /// property name.
    fn display_name(&self) -> Option<String> {
        None
    }

    /// Typed attribute map used by the filter engine.
    fn properties(&self) -> Option<Properties> {
        None
    }

    /// Stable identity, preferred over every other comparison rung.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// The non-repeatable subset of properties, for back-ends where a
    /// deleted name can be recreated and only some fields identify the
    /// original instance.
    fn unique_properties(&self) -> Option<Properties> {
        None
    }

    /// Receive the per-kind settings bag before the item is enqueued.
    fn apply_settings(&mut self, _settings: &Setting) {}

    /// Custom post-remove wait probe, invoked once all declared
    /// dependencies have drained. An `Err` marks the item failed.
    async fn handle_wait(&self, _ctx: &CancellationToken) -> Result<()> {
        Ok(())
    }

    /// Hook invoked by the scanner right before the resource is wrapped
    /// into a queue item.
    fn before_enqueue(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}

/// Option bundle handed to listers; the engine treats it as opaque and
/// listers downcast to their concrete type. `Debug` feeds the scanner's
/// duplicate-registration fingerprint.
pub trait ScanOpts: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> ScanOpts for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type Opts = Arc<dyn ScanOpts>;

/// Opts value for embedders whose listers take no options.
pub fn no_opts() -> Opts {
    Arc::new(())
}

/// Enumerates every instance of one resource kind visible under the given
/// options bundle.
#[async_trait]
pub trait Lister: Send + Sync {
    async fn list(&self, ctx: &CancellationToken, opts: &Opts) -> Result<Vec<Box<dyn Resource>>>;
}
