//! Namespaced env store with lazy resolution, export and merge.

use super::trie::Trie;
use super::value::{EnvEntry, ValueKind};
use crate::error::{EnvError, EnvResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// How entries of the second store are combined with the first during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// First writer wins; later stores only contribute new keys.
    Preserve,
    /// Later writers replace earlier ones.
    Overwrite,
    /// Later writers replace earlier ones only for allow-listed keys.
    #[default]
    #[serde(alias = "update_new_only")]
    AllowList,
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::Preserve => write!(f, "preserve"),
            MergePolicy::Overwrite => write!(f, "overwrite"),
            MergePolicy::AllowList => write!(f, "allow_list"),
        }
    }
}

/// Context shared by every per-store merge of a tree merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub policy: MergePolicy,
    /// Store that `global` entries of the merged store point into.
    pub ref_store: Option<&'a Arc<EnvStore>>,
    /// Allow list consulted under [`MergePolicy::AllowList`].
    pub trie: Option<&'a Trie>,
    /// Path of the merged store inside its tree, e.g. `["services", "default"]`.
    pub prefix: &'a [&'a str],
}

impl<'a> MergeContext<'a> {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            ref_store: None,
            trie: None,
            prefix: &[],
        }
    }

    pub fn with_ref_store(mut self, ref_store: &'a Arc<EnvStore>) -> Self {
        self.ref_store = Some(ref_store);
        self
    }

    pub fn with_trie(mut self, trie: &'a Trie) -> Self {
        self.trie = Some(trie);
        self
    }

    pub fn with_prefix(mut self, prefix: &'a [&'a str]) -> Self {
        self.prefix = prefix;
        self
    }

    fn allows(&self, namespace: &str, key: &str) -> bool {
        let Some(trie) = self.trie else {
            return false;
        };
        let path: Vec<&str> = self
            .prefix
            .iter()
            .copied()
            .chain([namespace, key])
            .collect();
        trie.has(&path)
    }
}

/// Mapping of namespace to keyed entries.
///
/// A store is built once, namespace by namespace, and is read-only
/// afterwards apart from each entry's resolution cache. Stores referenced
/// by `global` entries must be complete before they are shared.
#[derive(Debug, Default)]
pub struct EnvStore {
    namespaces: BTreeMap<String, BTreeMap<String, EnvEntry>>,
}

impl EnvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace from a `{constant, global, auto}` mapping.
    ///
    /// The namespace is added only if every entry is valid.
    pub fn add_namespace(
        &mut self,
        namespace: &str,
        entries: &Value,
        ref_store: Option<&Arc<EnvStore>>,
    ) -> EnvResult<()> {
        if self.namespaces.contains_key(namespace) {
            return Err(EnvError::NamespaceExists(namespace.to_string()));
        }
        let sections = as_mapping(entries, namespace)?;

        let mut by_kind: BTreeMap<ValueKind, Map<String, Value>> = BTreeMap::new();
        for (kind_name, section) in &sections {
            let kind: ValueKind = kind_name.parse()?;
            let path = format!("{namespace}.{kind_name}");
            by_kind.insert(kind, as_mapping(section, &path)?);
        }

        if ref_store.is_none()
            && by_kind
                .get(&ValueKind::Global)
                .is_some_and(|globals| !globals.is_empty())
        {
            return Err(EnvError::unsupported_global(namespace));
        }

        let mut registered = BTreeMap::new();
        for kind in ValueKind::ALL {
            for (key, raw) in by_kind.remove(&kind).unwrap_or_default() {
                if registered.contains_key(&key) {
                    return Err(EnvError::key_exists(namespace, &key));
                }
                let entry = EnvEntry::new(namespace, &key, raw, kind, ref_store)?;
                registered.insert(key, entry);
            }
        }

        debug!(namespace, keys = registered.len(), "Registered namespace");
        self.namespaces.insert(namespace.to_string(), registered);
        Ok(())
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn has_env(&self, namespace: &str, key: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|entries| entries.contains_key(key))
    }

    /// Namespace names, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Look up a registered entry without resolving it.
    pub fn entry(&self, namespace: &str, key: &str) -> EnvResult<&EnvEntry> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| EnvError::UnknownNamespace(namespace.to_string()))?
            .get(key)
            .ok_or_else(|| EnvError::UnknownKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    /// Resolve one value. Repeated calls return the cached value.
    pub fn get_env(&self, namespace: &str, key: &str) -> EnvResult<&Value> {
        self.entry(namespace, key)?.resolve()
    }

    /// Resolve every key of a namespace.
    pub fn get_namespace_envs(&self, namespace: &str) -> EnvResult<BTreeMap<String, Value>> {
        let entries = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| EnvError::UnknownNamespace(namespace.to_string()))?;
        entries
            .iter()
            .map(|(key, entry)| Ok((key.clone(), entry.resolve()?.clone())))
            .collect()
    }

    /// Rebuild the `{namespace: {constant, global, auto}}` document.
    ///
    /// Frozen `auto` entries are written as constants holding their resolved
    /// value; other entries keep their raw spec. Returns `None` when there
    /// is nothing to export.
    pub fn export_dict(&self) -> EnvResult<Option<Value>> {
        let mut document = Map::new();
        for (namespace, entries) in &self.namespaces {
            let mut sections: BTreeMap<ValueKind, Map<String, Value>> = BTreeMap::new();
            for (key, entry) in entries {
                let (kind, value) = if entry.is_frozen_auto() {
                    (ValueKind::Constant, entry.resolve()?.clone())
                } else {
                    (entry.kind(), entry.raw().clone())
                };
                sections.entry(kind).or_default().insert(key.clone(), value);
            }
            if sections.is_empty() {
                continue;
            }
            let sections = sections
                .into_iter()
                .map(|(kind, values)| (kind.as_str().to_string(), Value::Object(values)))
                .collect();
            document.insert(namespace.clone(), Value::Object(sections));
        }
        if document.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(document)))
        }
    }

    /// Merge `first` then `second` into a new store.
    ///
    /// Entries are re-registered from their raw specs against
    /// `ctx.ref_store`, so resolution caches are not carried over.
    pub fn merge(first: &EnvStore, second: &EnvStore, ctx: MergeContext<'_>) -> EnvResult<EnvStore> {
        let mut merged = EnvStore::new();
        merged.merge_from(first, &ctx)?;
        merged.merge_from(second, &ctx)?;
        Ok(merged)
    }

    fn merge_from(&mut self, other: &EnvStore, ctx: &MergeContext<'_>) -> EnvResult<()> {
        for (namespace, entries) in &other.namespaces {
            for (key, incoming) in entries {
                if incoming.kind() == ValueKind::Global && ctx.ref_store.is_none() {
                    return Err(EnvError::unsupported_global(namespace));
                }
                let write = match self.namespaces.get(namespace).and_then(|e| e.get(key)) {
                    None => true,
                    Some(existing) => match ctx.policy {
                        MergePolicy::Preserve => false,
                        MergePolicy::Overwrite => true,
                        MergePolicy::AllowList => {
                            ctx.allows(namespace, key)
                                && !(incoming.is_frozen_auto()
                                    && existing.kind() == ValueKind::Constant)
                        }
                    },
                };
                if !write {
                    debug!(namespace, key, policy = %ctx.policy, "Keeping existing entry");
                    continue;
                }
                let entry = EnvEntry::new(
                    namespace,
                    key,
                    incoming.raw().clone(),
                    incoming.kind(),
                    ctx.ref_store,
                )?;
                self.namespaces
                    .entry(namespace.clone())
                    .or_default()
                    .insert(key.clone(), entry);
            }
            self.namespaces.entry(namespace.clone()).or_default();
        }
        Ok(())
    }
}

/// Interpret `value` as a mapping; null counts as empty.
pub(crate) fn as_mapping(value: &Value, path: &str) -> EnvResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(EnvError::malformed(path, "a mapping")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn global_store() -> Arc<EnvStore> {
        let mut store = EnvStore::new();
        store
            .add_namespace(
                "base",
                &json!({"constant": {"VAR1": "gvalue1", "VAR3": "gvalue2"}}),
                None,
            )
            .unwrap();
        store
            .add_namespace(
                "advanced",
                &json!({"constant": {"GVAR1": "gvalue3", "GVAR2": "gvalue4"}}),
                None,
            )
            .unwrap();
        Arc::new(store)
    }

    fn store_of(namespaces: Value, ref_store: Option<&Arc<EnvStore>>) -> EnvStore {
        let mut store = EnvStore::new();
        for (ns, entries) in namespaces.as_object().unwrap() {
            store.add_namespace(ns, entries, ref_store).unwrap();
        }
        store
    }

    #[test]
    fn test_constants() {
        let store = store_of(
            json!({
                "ns1": {"constant": {"VAR1": "value1", "VAR2": "value2"}},
                "ns2": {"constant": {"VAR1": "value3", "VAR3": "value4"}}
            }),
            None,
        );
        assert_eq!(store.get_env("ns1", "VAR1").unwrap(), "value1");
        assert_eq!(store.get_env("ns2", "VAR1").unwrap(), "value3");
        assert_eq!(store.namespaces(), vec!["ns1", "ns2"]);
        assert!(store.has_env("ns2", "VAR3"));
        assert!(!store.has_env("ns2", "VAR2"));
        assert!(!store.has_env("ns3", "VAR1"));
    }

    #[test]
    fn test_global_reference_resolves_through_ref_store() {
        let global = global_store();
        let mut store = EnvStore::new();
        store
            .add_namespace(
                "ns1",
                &json!({"global": {"VAR3": "base.VAR1", "VAR9": "advanced.GVAR1"}}),
                Some(&global),
            )
            .unwrap();
        assert_eq!(store.get_env("ns1", "VAR3").unwrap(), "gvalue1");
        assert_eq!(store.get_env("ns1", "VAR9").unwrap(), "gvalue3");
    }

    #[test]
    fn test_dangling_global_reference_fails_on_resolution() {
        let global = global_store();
        let mut store = EnvStore::new();
        store
            .add_namespace("ns1", &json!({"global": {"X": "base.MISSING"}}), Some(&global))
            .unwrap();
        assert_eq!(
            store.get_env("ns1", "X").unwrap_err(),
            EnvError::UnknownKey {
                namespace: "base".into(),
                key: "MISSING".into()
            }
        );
    }

    #[test]
    fn test_duplicate_key_across_kinds() {
        let global = global_store();
        let mut store = EnvStore::new();
        let err = store
            .add_namespace(
                "ns1",
                &json!({"global": {"VAR1": "base.VAR1"}, "constant": {"VAR1": "cst_value"}}),
                Some(&global),
            )
            .unwrap_err();
        assert_eq!(err, EnvError::key_exists("ns1", "VAR1"));
        assert!(!store.has_namespace("ns1"));
    }

    #[test]
    fn test_namespace_exists() {
        let mut store = store_of(json!({"ns1": {"constant": {"A": 1}}}), None);
        let err = store
            .add_namespace("ns1", &json!({"constant": {"B": 2}}), None)
            .unwrap_err();
        assert_eq!(err, EnvError::NamespaceExists("ns1".into()));
    }

    #[test]
    fn test_unknown_kind_and_missing_ref_store() {
        let mut store = EnvStore::new();
        assert_eq!(
            store
                .add_namespace("ns1", &json!({"computed": {"A": 1}}), None)
                .unwrap_err(),
            EnvError::UnknownValueKind("computed".into())
        );
        assert_eq!(
            store
                .add_namespace("ns1", &json!({"global": {"A": "base.VAR1"}}), None)
                .unwrap_err(),
            EnvError::unsupported_global("ns1")
        );
        // an empty global section needs no reference store
        store
            .add_namespace("ns1", &json!({"global": {}, "constant": {"A": 1}}), None)
            .unwrap();
    }

    #[test]
    fn test_unknown_lookups() {
        let store = store_of(json!({"ns1": {"constant": {"A": 1}}}), None);
        assert_eq!(
            store.get_env("nope", "A").unwrap_err(),
            EnvError::UnknownNamespace("nope".into())
        );
        assert!(matches!(
            store.get_env("ns1", "B"),
            Err(EnvError::UnknownKey { .. })
        ));
        assert!(store.get_namespace_envs("nope").is_err());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let store = store_of(
            json!({"ns1": {"auto": {"ID": "random_uuid", "PWD": {"type": "secret", "length": 16}}}}),
            None,
        );
        let id = store.get_env("ns1", "ID").unwrap().clone();
        let pwd = store.get_env("ns1", "PWD").unwrap().clone();
        assert_eq!(store.get_env("ns1", "ID").unwrap(), &id);
        assert_eq!(store.get_env("ns1", "PWD").unwrap(), &pwd);
        let envs = store.get_namespace_envs("ns1").unwrap();
        assert_eq!(envs["ID"], id);
        assert_eq!(envs["PWD"], pwd);
    }

    #[test]
    fn test_export_freezes_auto_values() {
        let store = store_of(
            json!({"ns1": {"auto": {
                "VARAUTO1": "random_uuid",
                "SALT": {"type": "secret", "freeze": false}
            }}}),
            None,
        );
        let resolved = store.get_env("ns1", "VARAUTO1").unwrap().clone();
        let exported = store.export_dict().unwrap().unwrap();
        assert_eq!(exported["ns1"]["constant"]["VARAUTO1"], resolved);
        assert_eq!(
            exported["ns1"]["auto"]["SALT"],
            json!({"type": "secret", "freeze": false})
        );
    }

    #[test]
    fn test_export_round_trip_constants_and_globals() {
        let global = global_store();
        let document = json!({
            "ns1": {"constant": {"A": "x", "B": 3, "C": true}, "global": {"G": "base.VAR1"}},
            "ns2": {"global": {"H": "advanced.GVAR2"}}
        });
        let store = store_of(document.clone(), Some(&global));
        assert_eq!(store.export_dict().unwrap(), Some(document));
    }

    #[test]
    fn test_export_empty_store() {
        assert_eq!(EnvStore::new().export_dict().unwrap(), None);
    }

    #[test]
    fn test_merge_preserve() {
        let a = store_of(json!({"ns": {"constant": {"A": "a1", "B": "a2"}}}), None);
        let b = store_of(json!({"ns": {"constant": {"B": "b2", "C": "b3"}}, "other": {"constant": {"D": "b4"}}}), None);
        let merged = EnvStore::merge(&a, &b, MergeContext::new(MergePolicy::Preserve)).unwrap();
        assert_eq!(merged.get_env("ns", "A").unwrap(), "a1");
        assert_eq!(merged.get_env("ns", "B").unwrap(), "a2");
        assert_eq!(merged.get_env("ns", "C").unwrap(), "b3");
        assert_eq!(merged.get_env("other", "D").unwrap(), "b4");
    }

    #[test]
    fn test_merge_overwrite() {
        let a = store_of(json!({"ns": {"constant": {"A": "a1", "B": "a2"}}}), None);
        let b = store_of(json!({"ns": {"auto": {"B": {"type": "secret", "whitelist": "z", "length": 2}}}}), None);
        let merged = EnvStore::merge(&a, &b, MergeContext::new(MergePolicy::Overwrite)).unwrap();
        assert_eq!(merged.get_env("ns", "A").unwrap(), "a1");
        assert_eq!(merged.get_env("ns", "B").unwrap(), "zz");
        assert_eq!(merged.entry("ns", "B").unwrap().kind(), ValueKind::Auto);
    }

    #[test]
    fn test_merge_allow_list() {
        let a = store_of(json!({"ns": {"constant": {"A": "a1", "B": "a2"}}}), None);
        let b = store_of(json!({"ns": {"constant": {"A": "b1", "B": "b2"}}}), None);
        let trie = Trie::from_dotted(["global.ns.A"]);
        let prefix = ["global"];
        let ctx = MergeContext::new(MergePolicy::AllowList)
            .with_trie(&trie)
            .with_prefix(&prefix);
        let merged = EnvStore::merge(&a, &b, ctx).unwrap();
        assert_eq!(merged.get_env("ns", "A").unwrap(), "b1");
        assert_eq!(merged.get_env("ns", "B").unwrap(), "a2");
    }

    #[test]
    fn test_merge_allow_list_keeps_frozen_constant() {
        let a = store_of(json!({"ns": {"constant": {"ID": "previous-id"}}}), None);
        let b = store_of(json!({"ns": {"auto": {"ID": "random_uuid"}}}), None);
        let trie = Trie::from_dotted(["global.*"]);
        let prefix = ["global"];
        let ctx = MergeContext::new(MergePolicy::AllowList)
            .with_trie(&trie)
            .with_prefix(&prefix);
        let merged = EnvStore::merge(&a, &b, ctx).unwrap();
        assert_eq!(merged.get_env("ns", "ID").unwrap(), "previous-id");
    }

    #[test]
    fn test_merge_allow_list_without_trie_adds_only_new_keys() {
        let a = store_of(json!({"ns": {"constant": {"A": "a1"}}}), None);
        let b = store_of(json!({"ns": {"constant": {"A": "b1", "B": "b2"}}}), None);
        let merged = EnvStore::merge(&a, &b, MergeContext::new(MergePolicy::AllowList)).unwrap();
        assert_eq!(merged.get_env("ns", "A").unwrap(), "a1");
        assert_eq!(merged.get_env("ns", "B").unwrap(), "b2");
    }

    #[test]
    fn test_merge_global_needs_ref_store() {
        let global = global_store();
        let a = store_of(json!({"ns": {"global": {"A": "base.VAR1"}}}), Some(&global));
        let err = EnvStore::merge(&a, &EnvStore::new(), MergeContext::new(MergePolicy::Preserve))
            .unwrap_err();
        assert_eq!(err, EnvError::unsupported_global("ns"));

        let merged = EnvStore::merge(
            &a,
            &EnvStore::new(),
            MergeContext::new(MergePolicy::Preserve).with_ref_store(&global),
        )
        .unwrap();
        assert_eq!(merged.get_env("ns", "A").unwrap(), "gvalue1");
    }

    #[test]
    fn test_merge_is_a_fold() {
        let a = store_of(json!({"ns": {"constant": {"A": "a", "B": "a"}}}), None);
        let b = store_of(json!({"ns": {"constant": {"B": "b", "C": "b"}}}), None);
        let c = store_of(json!({"ns": {"constant": {"C": "c", "D": "c"}}, "x": {"constant": {"E": "c"}}}), None);
        for policy in [MergePolicy::Preserve, MergePolicy::Overwrite] {
            let ctx = MergeContext::new(policy);
            let left = EnvStore::merge(&EnvStore::merge(&a, &b, ctx).unwrap(), &c, ctx).unwrap();
            let right = EnvStore::merge(&a, &EnvStore::merge(&b, &c, ctx).unwrap(), ctx).unwrap();
            assert_eq!(left.export_dict().unwrap(), right.export_dict().unwrap());
        }
    }

    /// Kind and raw spec per key, compared without resolving generators.
    fn layout(store: &EnvStore) -> BTreeMap<(String, String), (ValueKind, Value)> {
        let mut layout = BTreeMap::new();
        for (namespace, entries) in &store.namespaces {
            for (key, entry) in entries {
                layout.insert(
                    (namespace.clone(), key.clone()),
                    (entry.kind(), entry.raw().clone()),
                );
            }
        }
        layout
    }

    #[test]
    fn test_merge_is_a_fold_with_frozen_autos() {
        let a = store_of(
            json!({"ns": {"constant": {"A": "a", "ID": "a-id"}, "auto": {"T": "random_uuid"}}}),
            None,
        );
        let b = store_of(
            json!({"ns": {
                "constant": {"T": "b"},
                "auto": {"ID": "random_uuid", "B": {"type": "secret", "freeze": false}}
            }}),
            None,
        );
        let c = store_of(
            json!({"ns": {"constant": {"ID": "c-id", "B": "c"}, "auto": {"A": "random_uuid"}}}),
            None,
        );
        let trie = Trie::from_dotted(["global.ns.ID", "global.ns.T", "global.ns.B"]);
        let prefix = ["global"];
        for policy in [MergePolicy::Preserve, MergePolicy::Overwrite, MergePolicy::AllowList] {
            let ctx = MergeContext::new(policy).with_trie(&trie).with_prefix(&prefix);
            let left = EnvStore::merge(&EnvStore::merge(&a, &b, ctx).unwrap(), &c, ctx).unwrap();
            let right = EnvStore::merge(&a, &EnvStore::merge(&b, &c, ctx).unwrap(), ctx).unwrap();
            assert_eq!(layout(&left), layout(&right), "policy {policy}");
        }

        let ctx = MergeContext::new(MergePolicy::AllowList)
            .with_trie(&trie)
            .with_prefix(&prefix);
        let merged = EnvStore::merge(&EnvStore::merge(&a, &b, ctx).unwrap(), &c, ctx).unwrap();
        let layout = layout(&merged);
        let kind_of = |key: &str| layout[&("ns".to_string(), key.to_string())].0;
        // not allow-listed: the first store keeps its constant
        assert_eq!(merged.get_env("ns", "A").unwrap(), "a");
        // the frozen auto from `b` never replaced a constant
        assert_eq!(merged.get_env("ns", "ID").unwrap(), "c-id");
        assert_eq!(kind_of("T"), ValueKind::Constant);
        assert_eq!(merged.get_env("ns", "B").unwrap(), "c");
    }

    #[test]
    fn test_merge_policy_names() {
        let policy: MergePolicy = serde_yaml::from_str("update_new_only").unwrap();
        assert_eq!(policy, MergePolicy::AllowList);
        let policy: MergePolicy = serde_yaml::from_str("overwrite").unwrap();
        assert_eq!(policy, MergePolicy::Overwrite);
        assert_eq!(MergePolicy::default().to_string(), "allow_list");
    }
}
