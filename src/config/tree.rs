//! Two-section configuration document: `global` and per-server `services`.
//!
//! ```yaml
//! global:
//!   postgres:
//!     constant: { POSTGRES_USER: admin }
//!     auto: { POSTGRES_PASSWORD: { type: secret, length: 24 } }
//! services:
//!   default:
//!     core:
//!       global: { DB_USER: postgres.POSTGRES_USER }
//!       auto: { CORE_ID: random_uuid }
//! ```

use crate::env::{EnvStore, MergeContext, MergePolicy, Trie, as_mapping};
use crate::error::{EnvError, EnvResult};
use anyhow::Context;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Top-level sections of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Global,
    Services,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 2] = [ConfigSection::Global, ConfigSection::Services];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSection::Global => "global",
            ConfigSection::Services => "services",
        }
    }

    fn parse(section: &str) -> EnvResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == section)
            .ok_or_else(|| EnvError::UnknownConfigSection {
                section: section.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(ConfigSection::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl std::fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One global store plus one store per server.
///
/// Every server store is built with the tree's global store as its
/// reference store; the global store itself never references anything.
#[derive(Debug, Default)]
pub struct ConfigTree {
    global: Arc<EnvStore>,
    servers: BTreeMap<String, EnvStore>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a parsed document. `null` yields an empty tree.
    pub fn from_document(document: &Value) -> EnvResult<Self> {
        let sections = match document {
            Value::Null => return Ok(Self::new()),
            Value::Object(sections) => sections,
            _ => return Err(EnvError::malformed("<root>", "a mapping")),
        };
        for section in sections.keys() {
            ConfigSection::parse(section)?;
        }

        let mut global = EnvStore::new();
        if let Some(namespaces) = sections.get(ConfigSection::Global.as_str()) {
            for (namespace, entries) in as_mapping(namespaces, "global")? {
                global.add_namespace(&namespace, &entries, None)?;
            }
        }
        let global = Arc::new(global);

        let mut servers = BTreeMap::new();
        if let Some(servers_section) = sections.get(ConfigSection::Services.as_str()) {
            for (server, namespaces) in as_mapping(servers_section, "services")? {
                let mut store = EnvStore::new();
                let path = format!("services.{server}");
                for (namespace, entries) in as_mapping(&namespaces, &path)? {
                    store.add_namespace(&namespace, &entries, Some(&global))?;
                }
                servers.insert(server, store);
            }
        }

        Ok(Self { global, servers })
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let document: Value = serde_yaml::from_str(content).context("invalid YAML document")?;
        Ok(Self::from_document(&document)?)
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("in '{}'", path.display()))
    }

    /// Load a configuration file, or `None` if it does not exist.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn global_envs(&self) -> &Arc<EnvStore> {
        &self.global
    }

    /// Server names, sorted.
    pub fn servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn has_server(&self, server: &str) -> bool {
        self.servers.contains_key(server)
    }

    pub fn server_store(&self, server: &str) -> EnvResult<&EnvStore> {
        self.servers
            .get(server)
            .ok_or_else(|| EnvError::UnknownServer(server.to_string()))
    }

    /// Namespaces (services) declared for `server`.
    pub fn services(&self, server: &str) -> EnvResult<Vec<String>> {
        Ok(self.server_store(server)?.namespaces())
    }

    /// Export the tree, freezing generated values.
    ///
    /// `services` is `null` when the tree has no server at all.
    pub fn export_dict(&self) -> EnvResult<Value> {
        let mut document = Map::new();
        document.insert(
            ConfigSection::Global.to_string(),
            self.global.export_dict()?.unwrap_or(Value::Null),
        );
        let services = if self.servers.is_empty() {
            Value::Null
        } else {
            let mut servers = Map::new();
            for (server, store) in &self.servers {
                servers.insert(server.clone(), store.export_dict()?.unwrap_or(Value::Null));
            }
            Value::Object(servers)
        };
        document.insert(ConfigSection::Services.to_string(), services);
        Ok(Value::Object(document))
    }

    /// Export the tree as YAML.
    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(&self.export_dict()?)?)
    }

    /// Merge two trees into a new one.
    ///
    /// `allow_list` holds dotted paths such as `global.*` or
    /// `services.default.core.VAR1`, consulted under
    /// [`MergePolicy::AllowList`]. Servers only found in `second` are copied
    /// and re-pointed at the merged global store.
    pub fn merge<S: AsRef<str>>(
        first: &ConfigTree,
        second: &ConfigTree,
        policy: MergePolicy,
        allow_list: &[S],
    ) -> EnvResult<ConfigTree> {
        let trie = Trie::from_dotted(allow_list);
        let global_prefix = [ConfigSection::Global.as_str()];
        let global = Arc::new(EnvStore::merge(
            &first.global,
            &second.global,
            MergeContext::new(policy)
                .with_trie(&trie)
                .with_prefix(&global_prefix),
        )?);

        let empty = EnvStore::new();
        let mut servers = BTreeMap::new();
        for (server, store) in &first.servers {
            let other = second.servers.get(server).unwrap_or(&empty);
            let prefix = [ConfigSection::Services.as_str(), server.as_str()];
            let ctx = MergeContext::new(policy)
                .with_ref_store(&global)
                .with_trie(&trie)
                .with_prefix(&prefix);
            servers.insert(server.clone(), EnvStore::merge(store, other, ctx)?);
        }
        for (server, store) in &second.servers {
            if servers.contains_key(server) {
                continue;
            }
            debug!(server = %server, "Adding server from second tree");
            let ctx = MergeContext::new(MergePolicy::Preserve).with_ref_store(&global);
            servers.insert(server.clone(), EnvStore::merge(store, &empty, ctx)?);
        }

        Ok(ConfigTree { global, servers })
    }
}
