// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pattern selection over registry entities.
//!
//! Each attribute gets its own optional regular expression. A missing
//! matcher accepts anything; configured matchers are combined with AND.
//! Matching is anchored at the start of the value only, so `/camera`
//! and `^/camera` select the same entities and `/camera` also selects
//! `/camera_info`.

use crate::error::{ChaosError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Selectable entity attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    /// Node, topic or service name.
    Name,
    /// Node XML-RPC address.
    Uri,
    /// Topic message type.
    Type,
    /// Parameter key.
    Key,
    /// Logger name inside a node.
    Logger,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Uri => "uri",
            Self::Type => "type",
            Self::Key => "key",
            Self::Logger => "logger",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled per-attribute matchers.
#[derive(Debug, Clone, Default)]
pub struct MatchSpec {
    matchers: BTreeMap<Attribute, Matcher>,
}

#[derive(Debug, Clone)]
struct Matcher {
    source: String,
    regex: Regex,
}

impl MatchSpec {
    /// A spec that accepts everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// Compile the given patterns; `None` leaves the attribute unconstrained.
    pub fn compile<'a, I>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Attribute, Option<&'a str>)>,
    {
        let mut matchers = BTreeMap::new();
        for (attribute, pattern) in patterns {
            let Some(pattern) = pattern else {
                continue;
            };
            // Validate the raw pattern first so errors point at operator input.
            Regex::new(pattern).map_err(|source| ChaosError::InvalidPattern {
                attribute: attribute.as_str(),
                source,
            })?;
            let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
                ChaosError::InvalidPattern {
                    attribute: attribute.as_str(),
                    source,
                }
            })?;
            matchers.insert(
                attribute,
                Matcher {
                    source: pattern.to_string(),
                    regex,
                },
            );
        }
        Ok(Self { matchers })
    }

    /// Node selection by name and address.
    pub fn nodes(name: Option<&str>, uri: Option<&str>) -> Result<Self> {
        Self::compile([(Attribute::Name, name), (Attribute::Uri, uri)])
    }

    /// Topic selection by name and message type.
    pub fn topics(name: Option<&str>, type_name: Option<&str>) -> Result<Self> {
        Self::compile([(Attribute::Name, name), (Attribute::Type, type_name)])
    }

    pub fn services(name: Option<&str>) -> Result<Self> {
        Self::compile([(Attribute::Name, name)])
    }

    pub fn params(key: Option<&str>) -> Result<Self> {
        Self::compile([(Attribute::Key, key)])
    }

    pub fn loggers(name: Option<&str>) -> Result<Self> {
        Self::compile([(Attribute::Logger, name)])
    }

    /// True when no attribute is constrained.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Whether `attribute` has a matcher.
    pub fn constrains(&self, attribute: Attribute) -> bool {
        self.matchers.contains_key(&attribute)
    }

    /// Check a single attribute; unconstrained attributes always pass.
    pub fn accepts(&self, attribute: Attribute, value: &str) -> bool {
        match self.matchers.get(&attribute) {
            Some(matcher) => matcher.regex.is_match(value),
            None => true,
        }
    }

    /// Check a one-to-many attribute: passes if any value matches.
    ///
    /// With a matcher configured and no values, nothing matches.
    pub fn accepts_any<'a, I>(&self, attribute: Attribute, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self.matchers.get(&attribute) {
            Some(matcher) => values.into_iter().any(|v| matcher.regex.is_match(v)),
            None => true,
        }
    }

    /// Evaluate every configured matcher against `attributes`.
    ///
    /// An attribute with a matcher but no value in `attributes` fails.
    pub fn matches(&self, attributes: &[(Attribute, &str)]) -> bool {
        self.matchers.iter().all(|(attribute, matcher)| {
            attributes
                .iter()
                .find(|(a, _)| a == attribute)
                .is_some_and(|(_, value)| matcher.regex.is_match(value))
        })
    }
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matchers.is_empty() {
            return f.write_str("*");
        }
        let parts: Vec<String> = self
            .matchers
            .iter()
            .map(|(attribute, matcher)| format!("{}~{}", attribute, matcher.source))
            .collect();
        f.write_str(&parts.join(" "))
    }
}
