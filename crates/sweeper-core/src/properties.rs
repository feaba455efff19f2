use std::collections::BTreeMap;
use std::fmt;

pub const TAG_PREFIX_KEY: &str = "_tagPrefix";

const DEFAULT_TAG_PREFIX: &str = "tag";

/// Ordered map of property name to stringified value for one resource.
///
/// Keys starting with `_` are reserved for engine bookkeeping; the only one
/// in use is `_tagPrefix`, which namespaces tag-valued properties as
/// `<prefix>:<tag-key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        values.insert(TAG_PREFIX_KEY.to_string(), DEFAULT_TAG_PREFIX.to_string());
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        let key = key.into();
        if key.is_empty() {
            return self;
        }
        self.values.insert(key, value.to_string());
        self
    }

    /// Like `set`, but a `None` value is a no-op. This is how optional
    /// attributes are threaded in without sprinkling `if let` at every
    /// call site.
    pub fn set_opt(&mut self, key: impl Into<String>, value: Option<impl fmt::Display>) -> &mut Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    pub fn set_with_prefix(&mut self, prefix: &str, key: &str, value: impl fmt::Display) -> &mut Self {
        if prefix.is_empty() {
            self.set(key, value)
        } else {
            self.set(format!("{prefix}:{key}"), value)
        }
    }

    pub fn set_tag(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        let namespaced = format!("{}:{}", self.tag_prefix(), key);
        self.set(namespaced, value)
    }

    pub fn set_tag_with_prefix(&mut self, prefix: &str, key: &str, value: impl fmt::Display) -> &mut Self {
        if prefix.is_empty() {
            self.set_tag(key, value)
        } else {
            let namespaced = format!("{}:{}:{}", self.tag_prefix(), prefix, key);
            self.set(namespaced, value)
        }
    }

    /// Reconfigure the namespace used by `set_tag`/`set_tag_with_prefix`.
    pub fn set_tag_prefix(&mut self, prefix: &str) -> &mut Self {
        self.values.insert(TAG_PREFIX_KEY.to_string(), prefix.to_string());
        self
    }

    fn tag_prefix(&self) -> &str {
        self.get(TAG_PREFIX_KEY).unwrap_or(DEFAULT_TAG_PREFIX)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for Properties {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut first = true;
        for (key, value) in &self.values {
            if key.starts_with('_') {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key}: \"{value}\"")?;
            first = false;
        }
        write!(f, "]")
    }
}
