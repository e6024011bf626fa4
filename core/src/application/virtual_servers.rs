// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The declarative virtual-server catalogue. Mirrors `ServiceRegistry`'s
//! copy-on-read snapshot pattern (spec §4.2, §6.2): `reload` is the only
//! mutation path, sourced from the same `GatewayConfig` the Service
//! Registry reloads from.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::config::GatewayConfig;
use crate::domain::errors::GatewayError;
use crate::domain::tool::{VirtualServer, VirtualServerName};

#[derive(Clone)]
pub struct VirtualServerStore {
    servers: Arc<RwLock<BTreeMap<VirtualServerName, VirtualServer>>>,
}

impl VirtualServerStore {
    pub fn new() -> Self {
        Self { servers: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    pub fn list(&self) -> Vec<VirtualServer> {
        self.servers.read().values().cloned().collect()
    }

    pub fn get(&self, name: &VirtualServerName) -> Result<VirtualServer, GatewayError> {
        self.servers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("virtual server {name}")))
    }

    pub fn reload(&self, config: &GatewayConfig) {
        let mut replacement = BTreeMap::new();
        for entry in &config.virtual_servers {
            let name = VirtualServerName::new(entry.name.clone());
            replacement.insert(
                name.clone(),
                VirtualServer { name, enabled: entry.enabled, members: entry.members.clone() },
            );
        }
        *self.servers.write() = replacement;
    }
}

impl Default for VirtualServerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{RouterPolicyConfig, VirtualServerConfigEntry};

    fn config() -> GatewayConfig {
        GatewayConfig {
            services: vec![],
            virtual_servers: vec![VirtualServerConfigEntry {
                name: "default".into(),
                enabled: true,
                members: vec![],
            }],
            router: RouterPolicyConfig::default(),
            flags: Default::default(),
        }
    }

    #[test]
    fn reload_replaces_catalogue() {
        let store = VirtualServerStore::new();
        store.reload(&config());
        assert_eq!(store.list().len(), 1);
        assert!(store.get(&VirtualServerName::new("default")).is_ok());
    }

    #[test]
    fn unknown_name_is_not_found() {
        let store = VirtualServerStore::new();
        assert!(matches!(store.get(&VirtualServerName::new("missing")), Err(GatewayError::NotFound(_))));
    }
}
