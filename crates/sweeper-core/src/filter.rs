use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Context, Result};
use glob::Pattern;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{Span, Timestamp};
use regex::Regex;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};

/// Key under which filters apply to every resource kind.
pub const GLOBAL: &str = "__global__";

pub const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    #[default]
    #[serde(rename = "exact", alias = "")]
    Exact,
    #[serde(rename = "glob")]
    Glob,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "prefix")]
    Prefix,
    #[serde(rename = "suffix")]
    Suffix,
    #[serde(rename = "dateOlderThan")]
    DateOlderThan,
    #[serde(rename = "dateOlderThanNow")]
    DateOlderThanNow,
    #[serde(rename = "In")]
    In,
    #[serde(rename = "NotIn")]
    NotIn,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Glob => "glob",
            Self::Regex => "regex",
            Self::Contains => "contains",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::DateOlderThan => "dateOlderThan",
            Self::DateOlderThanNow => "dateOlderThanNow",
            Self::In => "In",
            Self::NotIn => "NotIn",
        }
    }
}

/// One predicate over one property of one item.
///
/// Decodes from YAML either as a bare string (shorthand for an exact match
/// on the legacy identifier in the default group) or as a mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub group: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub property: String,
    pub value: String,
    pub values: Vec<String>,
    pub invert: bool,
}

impl Filter {
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            filter_type: FilterType::Exact,
            property: String::new(),
            value: value.into(),
            values: Vec::new(),
            invert: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.property.is_empty() && self.value.is_empty() {
            bail!("property or value must be set");
        }
        Ok(())
    }

    /// Evaluate this filter against a property value. Errors (bad regex,
    /// bad glob, unparseable dates or durations) are fatal to the caller;
    /// the invert flag is applied by the caller, not here.
    pub fn match_value(&self, value: &str) -> Result<bool> {
        match self.filter_type {
            FilterType::Exact => Ok(self.value == value),
            FilterType::Contains => Ok(value.contains(&self.value)),
            FilterType::Glob => {
                let pattern = Pattern::new(&self.value)
                    .with_context(|| format!("invalid glob pattern '{}'", self.value))?;
                Ok(pattern.matches(value))
            }
            FilterType::Regex => {
                let re = Regex::new(&self.value)
                    .with_context(|| format!("invalid regex '{}'", self.value))?;
                Ok(re.is_match(value))
            }
            FilterType::Prefix => Ok(value.starts_with(&self.value)),
            FilterType::Suffix => Ok(value.ends_with(&self.value)),
            FilterType::DateOlderThan => {
                // An empty value means the property is missing; that is not
                // an error, it just never matches.
                if value.is_empty() {
                    return Ok(false);
                }
                let then = parse_date(value)?;
                let duration = parse_duration(&self.value)?;
                Ok(then.checked_add(duration)? > Timestamp::now())
            }
            FilterType::DateOlderThanNow => {
                if value.is_empty() {
                    return Ok(false);
                }
                let then = parse_date(value)?;
                let duration = parse_duration(&self.value)?;
                Ok(Timestamp::now().checked_add(duration)? > then)
            }
            FilterType::In => Ok(self.values.iter().any(|v| v == value)),
            FilterType::NotIn => Ok(!self.values.iter().any(|v| v == value)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[type: {}", self.filter_type.as_str())?;
        if !self.property.is_empty() {
            write!(f, ", property: {}", self.property)?;
        }
        if !self.value.is_empty() {
            write!(f, ", value: {}", self.value)?;
        }
        if !self.values.is_empty() {
            write!(f, ", values: {}", self.values.join("|"))?;
        }
        if self.invert {
            write!(f, ", invert: true")?;
        }
        write!(f, "]")
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Shorthand(String),
            Mapping(FilterSpec),
        }

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct FilterSpec {
            group: Option<String>,
            #[serde(rename = "type")]
            filter_type: FilterType,
            property: String,
            value: String,
            values: Vec<String>,
            #[serde(deserialize_with = "bool_or_string")]
            invert: bool,
        }

        match Repr::deserialize(deserializer)? {
            Repr::Shorthand(value) => Ok(Filter::exact(value)),
            Repr::Mapping(spec) => Ok(Filter {
                group: spec.group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
                filter_type: spec.filter_type,
                property: spec.property,
                value: spec.value,
                values: spec.values,
                invert: spec.invert,
            }),
        }
    }
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Str(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Bool(b) => Ok(b),
        Repr::Str(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(D::Error::custom(format!("invert must be a boolean, got '{other}'"))),
        },
    }
}

fn parse_duration(value: &str) -> Result<Span> {
    value.parse::<Span>().with_context(|| format!("unable to parse duration '{value}'"))
}

fn parse_date(value: &str) -> Result<Timestamp> {
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(Timestamp::from_second(seconds)?);
    }
    // RFC 3339, with or without fractional seconds.
    if let Ok(ts) = value.parse::<Timestamp>() {
        return Ok(ts);
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = Date::strptime(format, value) {
            return Ok(date.to_zoned(TimeZone::UTC)?.timestamp());
        }
    }
    // "2006-01-02 15:04:05 -0700 MST": the trailing zone abbreviation is
    // redundant with the numeric offset, drop it before parsing.
    let trimmed = value
        .rsplit_once(' ')
        .filter(|(_, tail)| !tail.is_empty() && tail.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|(head, _)| head)
        .unwrap_or(value);
    if let Ok(ts) = Timestamp::strptime("%Y-%m-%d %H:%M:%S %z", trimmed) {
        return Ok(ts);
    }
    bail!("unable to parse date '{value}'")
}

/// Filters per resource kind name, with [`GLOBAL`] applying to every kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, Vec<Filter>>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: impl Into<String>, filters: Vec<Filter>) -> &mut Self {
        self.0.insert(kind.into(), filters);
        self
    }

    pub fn append(&mut self, kind: &str, filters: Vec<Filter>) -> &mut Self {
        self.0.entry(kind.to_string()).or_default().extend(filters);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&[Filter]> {
        self.0.get(kind).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Filter])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Append every list of `other` onto the corresponding kind, keeping
    /// existing entries first. Used to fold presets into account filters.
    pub fn merge(&mut self, other: Filters) -> &mut Self {
        for (kind, filters) in other.0 {
            self.0.entry(kind).or_default().extend(filters);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (kind, filters) in &self.0 {
            for filter in filters {
                filter.validate().with_context(|| format!("invalid filter for '{kind}'"))?;
            }
        }
        Ok(())
    }

    /// The filters applying to `kind` (global plus kind-specific), bucketed
    /// by group. An empty result means the kind is never filtered.
    pub fn get_by_group(&self, kind: &str) -> BTreeMap<String, Vec<&Filter>> {
        let mut groups: BTreeMap<String, Vec<&Filter>> = BTreeMap::new();
        for key in [GLOBAL, kind] {
            if let Some(filters) = self.0.get(key) {
                for filter in filters {
                    groups.entry(filter.group.clone()).or_default().push(filter);
                }
            }
        }
        groups
    }

    /// Rename keys according to `deprecated` (old name → replacement),
    /// warning per hit. Both old and new present is an error.
    pub fn resolve_deprecations(&mut self, deprecated: &std::collections::HashMap<String, String>) -> Result<()> {
        let old_keys: Vec<String> =
            self.0.keys().filter(|k| deprecated.contains_key(*k)).cloned().collect();
        for old in old_keys {
            let replacement = &deprecated[&old];
            if self.0.contains_key(replacement) {
                bail!("using deprecated resource type and replacement: '{old}','{replacement}'");
            }
            tracing::warn!("deprecated resource type '{old}' used, replace with '{replacement}'");
            let filters = self.0.remove(&old).unwrap_or_default();
            self.0.insert(replacement.clone(), filters);
        }
        Ok(())
    }
}

impl FromIterator<(String, Vec<Filter>)> for Filters {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Filter>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
