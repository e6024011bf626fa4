// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Aggregated view over every enabled upstream's tools, grouped into
//! virtual servers (C6, spec §4.6). Discovery is the only producer of
//! `Tool` records; a missing service is absent from snapshots, never an
//! error.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tracing::warn;

use crate::domain::service::ServiceName;
use crate::domain::tool::{
    FullyQualifiedToolName, ResolvedVirtualServer, Tool, VirtualServer, VirtualServerMember,
    MAX_RESOLVED_TOOLS,
};

#[derive(Clone)]
pub struct ToolCache {
    /// service -> its discovered tools. An `Arc<HashMap>`-snapshot-on-write
    /// pattern: readers clone the `Arc`, never the map.
    by_service: Arc<RwLock<BTreeMap<ServiceName, Arc<Vec<Tool>>>>>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self { by_service: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    /// Replaces one service's discovered tools (spec §4.6: discovery on
    /// first RUNNING and on a refresh interval).
    pub fn refresh(&self, service: ServiceName, tools: Vec<Tool>) {
        self.by_service.write().insert(service, Arc::new(tools));
    }

    pub fn invalidate(&self, service: &ServiceName) {
        self.by_service.write().remove(service);
    }

    pub fn snapshot(&self) -> Vec<Tool> {
        self.by_service.read().values().flat_map(|tools| tools.iter().cloned()).collect()
    }

    fn lookup(&self, fqtn: &FullyQualifiedToolName) -> Option<Tool> {
        let (service, _local) = fqtn.split()?;
        self.by_service
            .read()
            .get(&service)
            .and_then(|tools| tools.iter().find(|t| &t.fully_qualified_name == fqtn).cloned())
    }

    /// Resolves a virtual server's declared members into a deduplicated,
    /// ordered tool list, enforcing the 60-tool hard cap (spec §3, §4.6).
    /// Unknown members are silently skipped and recorded as a warning
    /// metric — resolution never panics.
    pub fn resolve(&self, virtual_server: &VirtualServer) -> ResolvedVirtualServer {
        let mut seen = std::collections::BTreeSet::new();
        let mut resolved = Vec::new();

        for member in &virtual_server.members {
            match member {
                VirtualServerMember::AllToolsOf(service) => {
                    let guard = self.by_service.read();
                    match guard.get(service) {
                        Some(tools) => {
                            for tool in tools.iter() {
                                if seen.insert(tool.fully_qualified_name.clone()) {
                                    resolved.push(tool.clone());
                                }
                            }
                        }
                        None => {
                            warn!(service = %service, virtual_server = %virtual_server.name, "unknown service member");
                            counter!("virtual_server.unknown_member").increment(1);
                        }
                    }
                }
                VirtualServerMember::Tool(fqtn) => match self.lookup(fqtn) {
                    Some(tool) => {
                        if seen.insert(tool.fully_qualified_name.clone()) {
                            resolved.push(tool);
                        }
                    }
                    None => {
                        warn!(tool = %fqtn, virtual_server = %virtual_server.name, "unknown tool member");
                        counter!("virtual_server.unknown_member").increment(1);
                    }
                },
            }
        }

        let truncated = resolved.len() > MAX_RESOLVED_TOOLS;
        if truncated {
            resolved.truncate(MAX_RESOLVED_TOOLS);
            counter!("virtual_server.truncated", "name" => virtual_server.name.to_string()).increment(1);
        }

        ResolvedVirtualServer { tools: resolved, truncated }
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::Schema;
    use crate::domain::tool::VirtualServerName;
    use std::collections::BTreeSet;

    fn tool(service: &str, local: &str) -> Tool {
        let service_name = ServiceName::new(service);
        Tool {
            fully_qualified_name: FullyQualifiedToolName::new(&service_name, local),
            local_name: local.to_string(),
            description: format!("{local} tool"),
            input_schema: Schema::Object { properties: Default::default(), required: vec![] },
            keywords: BTreeSet::new(),
        }
    }

    #[test]
    fn missing_service_is_not_an_error() {
        let cache = ToolCache::new();
        let vs = VirtualServer {
            name: VirtualServerName::new("default"),
            enabled: true,
            members: vec![VirtualServerMember::AllToolsOf(ServiceName::new("missing"))],
        };
        let resolved = cache.resolve(&vs);
        assert!(resolved.tools.is_empty());
        assert!(!resolved.truncated);
    }

    #[test]
    fn truncates_to_sixty_in_declared_order() {
        let cache = ToolCache::new();
        let tools: Vec<Tool> = (0..80).map(|i| tool("many", &format!("t{i:02}"))).collect();
        cache.refresh(ServiceName::new("many"), tools);
        let vs = VirtualServer {
            name: VirtualServerName::new("everything"),
            enabled: true,
            members: vec![VirtualServerMember::AllToolsOf(ServiceName::new("many"))],
        };
        let resolved = cache.resolve(&vs);
        assert_eq!(resolved.tools.len(), MAX_RESOLVED_TOOLS);
        assert!(resolved.truncated);
        assert_eq!(resolved.tools[59].local_name, "t59");
    }

    #[test]
    fn deduplicates_overlapping_members() {
        let cache = ToolCache::new();
        cache.refresh(ServiceName::new("fs"), vec![tool("fs", "read")]);
        let vs = VirtualServer {
            name: VirtualServerName::new("default"),
            enabled: true,
            members: vec![
                VirtualServerMember::AllToolsOf(ServiceName::new("fs")),
                VirtualServerMember::Tool(FullyQualifiedToolName::new(&ServiceName::new("fs"), "read")),
            ],
        };
        let resolved = cache.resolve(&vs);
        assert_eq!(resolved.tools.len(), 1);
    }
}
