pub mod collection;
pub mod errors;
pub mod filter;
pub mod properties;
pub mod queue;
pub mod registry;
pub mod resource;
pub mod scanner;
pub mod settings;
pub mod sweeper;

pub use collection::{resolve_resource_types, Collection};
pub use errors::ResourceError;
pub use filter::{Filter, FilterType, Filters};
pub use properties::Properties;
pub use queue::{Item, ItemState, Queue};
pub use registry::{Registration, Registry};
pub use resource::{no_opts, Lister, Opts, Resource, ScanOpts, DEFAULT_SCOPE};
pub use scanner::{MutateOptsFn, Scanner};
pub use settings::{Setting, Settings};
pub use sweeper::{Parameters, Sweeper};
