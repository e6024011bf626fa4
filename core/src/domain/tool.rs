// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool and virtual-server entities (spec §3): one invokable operation on
//! one upstream, and the named collections of tools materialized to IDE
//! clients as single MCP endpoints.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::schema::Schema;
use super::service::ServiceName;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "for", "and", "or", "is", "are", "be", "with",
    "this", "that", "it", "as", "at", "by", "from", "into", "my", "me", "please", "can", "you",
];

/// Lowercases, strips punctuation, splits on whitespace, drops stopwords.
/// Shared by `Tool::searchable_tokens` and the Keyword Scorer (spec §4.7),
/// which normalizes the task text the same way before comparing token sets.
pub fn normalize_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// `serviceName + "/" + localName`, the tool's stable identity across the
/// whole gateway.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FullyQualifiedToolName(String);

impl FullyQualifiedToolName {
    pub fn new(service: &ServiceName, local_name: &str) -> Self {
        Self(format!("{}/{}", service.as_str(), local_name))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits back into `(serviceName, localName)`; `None` if malformed.
    pub fn split(&self) -> Option<(ServiceName, &str)> {
        let (service, local) = self.0.split_once('/')?;
        Some((ServiceName::new(service), local))
    }
}

impl fmt::Display for FullyQualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub fully_qualified_name: FullyQualifiedToolName,
    pub local_name: String,
    pub description: String,
    pub input_schema: Schema,
    pub keywords: BTreeSet<String>,
}

impl Tool {
    pub fn service_name(&self) -> Option<ServiceName> {
        self.fully_qualified_name.split().map(|(service, _)| service)
    }

    /// Combined, lowercase token bag of name + description + declared
    /// keywords, used by the Keyword Scorer (spec §4.7).
    pub fn searchable_tokens(&self) -> BTreeSet<String> {
        let mut tokens = normalize_tokens(&self.local_name);
        tokens.extend(normalize_tokens(&self.description));
        tokens.extend(self.keywords.iter().cloned());
        tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VirtualServerName(String);

impl VirtualServerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A virtual server's declared member: either every tool of a service
/// (wildcard) or one explicit tool. Declared in config as a plain string —
/// `"fs"` wildcards the whole service, `"fs/read"` names one tool — so it
/// (de)serializes to/from that string rather than a tagged enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualServerMember {
    AllToolsOf(ServiceName),
    Tool(FullyQualifiedToolName),
}

impl Serialize for VirtualServerMember {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            VirtualServerMember::AllToolsOf(name) => serializer.serialize_str(name.as_str()),
            VirtualServerMember::Tool(name) => serializer.serialize_str(name.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for VirtualServerMember {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw.contains('/') {
            VirtualServerMember::Tool(FullyQualifiedToolName::from_raw(raw))
        } else {
            VirtualServerMember::AllToolsOf(ServiceName::new(raw))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualServer {
    pub name: VirtualServerName,
    pub enabled: bool,
    pub members: Vec<VirtualServerMember>,
}

/// The hard cap on a resolved virtual server's tool list (spec §3, §4.6).
pub const MAX_RESOLVED_TOOLS: usize = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVirtualServer {
    pub tools: Vec<Tool>,
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_qualified_name_round_trips() {
        let name = FullyQualifiedToolName::new(&ServiceName::new("fs"), "read");
        assert_eq!(name.as_str(), "fs/read");
        let (service, local) = name.split().unwrap();
        assert_eq!(service.as_str(), "fs");
        assert_eq!(local, "read");
    }
}
