use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, RwLock};

use anyhow::{bail, Result};
use tracing::warn;

use crate::collection::Collection;
use crate::resource::{Lister, DEFAULT_SCOPE};

/// Everything the engine knows about one resource kind.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub scope: String,
    pub lister: Arc<dyn Lister>,
    /// Kinds that must be fully drained before this one is attempted.
    pub depends_on: Vec<String>,
    pub deprecated_aliases: Vec<String>,
    /// Name of the kind this registration is an alternative for, if any.
    pub alternative: Option<String>,
    /// Setting keys this kind's resources understand.
    pub settings: Vec<String>,
}

impl Registration {
    pub fn new(name: impl Into<String>, lister: Arc<dyn Lister>) -> Self {
        Self {
            name: name.into(),
            scope: DEFAULT_SCOPE.to_string(),
            lister,
            depends_on: Vec::new(),
            deprecated_aliases: Vec::new(),
            alternative: None,
            settings: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("depends_on", &self.depends_on)
            .field("deprecated_aliases", &self.deprecated_aliases)
            .field("alternative", &self.alternative)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Catalog of resource kinds.
///
/// Usually populated through the process-wide default instance (see
/// [`register`]); the engine also accepts an injected value so tests can
/// build isolated catalogs.
#[derive(Clone, Default)]
pub struct Registry {
    registrations: Vec<Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: Registration) -> Result<()> {
        if self.get_registration(&registration.name).is_some() {
            bail!("a resource type with the name '{}' already exists", registration.name);
        }
        if let Some(alternative) = &registration.alternative {
            if let Some(existing) =
                self.registrations.iter().find(|r| r.alternative.as_deref() == Some(alternative.as_str()))
            {
                bail!(
                    "resource type '{}' is already an alternative for '{}', cannot also be one for '{}'",
                    alternative,
                    existing.name,
                    registration.name
                );
            }
        }
        self.registrations.push(registration);
        Ok(())
    }

    pub fn get_registration(&self, name: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.name == name)
    }

    pub fn depends_on(&self, name: &str) -> &[String] {
        self.get_registration(name).map(|r| r.depends_on.as_slice()).unwrap_or(&[])
    }

    /// All registrations in registration order.
    pub fn listers(&self) -> &[Registration] {
        &self.registrations
    }

    /// Registrations in dependency order: every kind appears after the kinds
    /// it depends on. Edges only exist between registered kinds; a declared
    /// dependency on an unregistered name is ignored until that name shows
    /// up. Cycles degrade to registration order for the remainder.
    pub fn sorted(&self) -> Vec<&Registration> {
        let names: HashSet<&str> = self.registrations.iter().map(|r| r.name.as_str()).collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for reg in &self.registrations {
            let degree = reg.depends_on.iter().filter(|d| names.contains(d.as_str())).count();
            in_degree.insert(reg.name.as_str(), degree);
        }

        let mut order: Vec<&Registration> = Vec::with_capacity(self.registrations.len());
        let mut ready: Vec<&Registration> =
            self.registrations.iter().filter(|r| in_degree[r.name.as_str()] == 0).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        while !ready.is_empty() {
            let reg = ready.remove(0);
            order.push(reg);
            seen.insert(reg.name.as_str());
            for candidate in &self.registrations {
                if seen.contains(candidate.name.as_str()) {
                    continue;
                }
                if candidate.depends_on.iter().any(|d| d == &reg.name) {
                    let degree = in_degree.get_mut(candidate.name.as_str()).expect("known kind");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(candidate);
                    }
                }
            }
        }

        if order.len() != self.registrations.len() {
            warn!("dependency cycle between resource types, falling back to registration order for the remainder");
            for reg in &self.registrations {
                if !seen.contains(reg.name.as_str()) {
                    order.push(reg);
                }
            }
        }

        order
    }

    pub fn listers_for_scope(&self, scope: &str) -> Vec<&Registration> {
        self.sorted().into_iter().filter(|r| r.scope == scope).collect()
    }

    /// Kind names in dependency order.
    pub fn names(&self) -> Collection {
        Collection::new(self.sorted().into_iter().map(|r| r.name.clone()).collect())
    }

    pub fn names_for_scope(&self, scope: &str) -> Collection {
        Collection::new(self.listers_for_scope(scope).into_iter().map(|r| r.name.clone()).collect())
    }

    /// Glob-expand `names` against the known kind names; unmatched entries
    /// pass through unchanged.
    pub fn expand_names(&self, names: &Collection) -> Collection {
        names.expand(&self.names())
    }

    /// Mapping from alternative kind name to the kind it replaces.
    pub fn alternative_mapping(&self) -> HashMap<String, String> {
        self.registrations
            .iter()
            .filter_map(|r| r.alternative.as_ref().map(|alt| (alt.clone(), r.name.clone())))
            .collect()
    }

    /// Mapping from deprecated alias to current kind name.
    pub fn deprecated_mapping(&self) -> HashMap<String, String> {
        let mut mapping = HashMap::new();
        for reg in &self.registrations {
            for alias in &reg.deprecated_aliases {
                mapping.insert(alias.clone(), reg.name.clone());
            }
        }
        mapping
    }

    /// Drop every registration. Tests only.
    pub fn clear(&mut self) {
        self.registrations.clear();
    }
}

static DEFAULT_REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::new()));

fn read_default() -> std::sync::RwLockReadGuard<'static, Registry> {
    match DEFAULT_REGISTRY.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_default() -> std::sync::RwLockWriteGuard<'static, Registry> {
    match DEFAULT_REGISTRY.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Register a kind with the process-wide default registry.
pub fn register(registration: Registration) -> Result<()> {
    write_default().register(registration)
}

/// Snapshot of the process-wide default registry.
pub fn global() -> Registry {
    read_default().clone()
}

/// Wipe the process-wide default registry. Tests only.
pub fn clear_registry() {
    write_default().clear();
}
