// ── Join maps ──
//
// A schema names the fields a device kind exposes over a bridge and
// assigns each a kind and an offset. Resolving a schema at a base join
// fixes the effective join numbers for one device on one bridge.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::signal::SignalKind;

/// Whether a field is one join or the first of a per-port run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum JoinSpan {
    Single,
    /// Run length comes from the owning device's port count.
    PerPort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinField {
    /// 0-based offset from the base join.
    pub offset: u32,
    pub kind: SignalKind,
    pub span: JoinSpan,
    pub description: String,
}

// ── Schema ───────────────────────────────────────────────────────

/// Compiled-in field layout for one device kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMapSchema {
    name: String,
    fields: IndexMap<String, JoinField>,
}

impl JoinMapSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn single(self, field: &str, offset: u32, kind: SignalKind, description: &str) -> Self {
        self.with_field(field, offset, kind, JoinSpan::Single, description)
    }

    pub fn per_port(self, field: &str, offset: u32, kind: SignalKind, description: &str) -> Self {
        self.with_field(field, offset, kind, JoinSpan::PerPort, description)
    }

    fn with_field(
        mut self,
        field: &str,
        offset: u32,
        kind: SignalKind,
        span: JoinSpan,
        description: &str,
    ) -> Self {
        self.fields.insert(
            field.to_owned(),
            JoinField {
                offset,
                kind,
                span,
                description: description.to_owned(),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&JoinField> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &JoinField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Bind the schema to a base join.
    pub fn resolve(&self, base: u32) -> JoinMap {
        JoinMap {
            schema: self.name.clone(),
            base,
            fields: self.fields.clone(),
        }
    }
}

// ── Resolved map ─────────────────────────────────────────────────

/// A schema bound to a base join.
///
/// Equality compares the schema and field layout only, so a map resolved
/// at join 1 equals the same map resolved at join 101.
#[derive(Debug, Clone)]
pub struct JoinMap {
    schema: String,
    base: u32,
    fields: IndexMap<String, JoinField>,
}

impl PartialEq for JoinMap {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.fields == other.fields
    }
}

impl Eq for JoinMap {}

/// One row of a join map dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinEntry {
    pub field: String,
    pub join: u32,
    pub kind: SignalKind,
    pub span: JoinSpan,
    pub description: String,
}

/// Field-level override as written in configuration. Anything not named
/// keeps its compiled-in value.
///
/// A field moves either by 0-based `offset` or by 1-based `joinNumber`
/// relative to the base join, never both.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FieldOverride {
    #[serde(default)]
    offset: Option<u32>,
    #[serde(default)]
    join_number: Option<u32>,
    #[serde(default)]
    kind: Option<SignalKind>,
    #[serde(default)]
    description: Option<String>,
}

impl JoinMap {
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn field(&self, name: &str) -> Option<&JoinField> {
        self.fields.get(name)
    }

    /// Effective join of a field. Per-port fields answer for index 1.
    pub fn join(&self, field: &str) -> Option<u32> {
        self.join_at(field, 1)
    }

    /// Effective join for the 1-based `index` of a field:
    /// `base + offset + (index - 1)`. Single fields only answer index 1.
    pub fn join_at(&self, field: &str, index: u32) -> Option<u32> {
        let spec = self.fields.get(field)?;
        let step = index.checked_sub(1)?;
        if spec.span == JoinSpan::Single && step > 0 {
            return None;
        }
        self.base.checked_add(spec.offset)?.checked_add(step)
    }

    /// Every field with its first effective join, in schema order.
    pub fn entries(&self) -> Vec<JoinEntry> {
        self.fields
            .iter()
            .map(|(name, spec)| JoinEntry {
                field: name.clone(),
                join: self.base.saturating_add(spec.offset),
                kind: spec.kind,
                span: spec.span,
                description: spec.description.clone(),
            })
            .collect()
    }

    /// Apply a configured override payload, returning a new map.
    ///
    /// The payload is an object of `{ field: { offset, kind?, description? } }`,
    /// or a string holding that object as JSON. Any problem rejects the
    /// whole override; the map is never partially updated.
    pub fn apply_override(&self, key: &str, payload: &Value) -> Result<Self, CoreError> {
        let reject = |reason: String| CoreError::JoinMapOverride {
            key: key.to_owned(),
            reason,
        };

        let parsed: IndexMap<String, FieldOverride> = match payload {
            Value::String(raw) => serde_json::from_str(raw).map_err(|e| reject(e.to_string()))?,
            other => IndexMap::deserialize(other).map_err(|e| reject(e.to_string()))?,
        };

        let mut fields = self.fields.clone();
        for (name, change) in parsed {
            let Some(field) = fields.get_mut(&name) else {
                return Err(reject(format!("unknown field '{name}' for schema '{}'", self.schema)));
            };
            if let Some(kind) = change.kind {
                if kind != field.kind {
                    return Err(reject(format!(
                        "field '{name}' is {}, override says {kind}",
                        field.kind
                    )));
                }
            }
            let offset = match (change.offset, change.join_number) {
                (Some(_), Some(_)) => {
                    return Err(reject(format!("field '{name}' sets both offset and joinNumber")));
                }
                (Some(offset), None) => Some(offset),
                (None, Some(join_number)) => Some(
                    join_number
                        .checked_sub(1)
                        .ok_or_else(|| reject(format!("field '{name}' has joinNumber 0")))?,
                ),
                (None, None) => None,
            };
            if let Some(offset) = offset {
                field.offset = offset;
            }
            if let Some(description) = change.description {
                field.description = description;
            }
        }

        let mut seen = HashSet::new();
        for (name, field) in &fields {
            if field.span == JoinSpan::Single && !seen.insert((field.kind, field.offset)) {
                return Err(reject(format!(
                    "field '{name}' reuses {} offset {}",
                    field.kind, field.offset
                )));
            }
        }

        Ok(Self {
            schema: self.schema.clone(),
            base: self.base,
            fields,
        })
    }
}

// ── Catalog ──────────────────────────────────────────────────────

/// Every known schema, by name.
#[derive(Debug, Default)]
pub struct JoinMapCatalog {
    schemas: IndexMap<String, JoinMapSchema>,
}

impl JoinMapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in device kind's schema.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        crate::device::display::register_join_maps(&mut catalog);
        crate::device::switcher::register_join_maps(&mut catalog);
        crate::device::room::register_join_maps(&mut catalog);
        catalog
    }

    /// Add a schema. The first registration of a name wins.
    pub fn register(&mut self, schema: JoinMapSchema) {
        if self.schemas.contains_key(schema.name()) {
            warn!(schema = %schema.name(), "join map schema already registered; keeping the first");
            return;
        }
        self.schemas.insert(schema.name().to_owned(), schema);
    }

    pub fn schema(&self, name: &str) -> Option<&JoinMapSchema> {
        self.schemas.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str, base: u32) -> Result<JoinMap, CoreError> {
        self.schemas
            .get(name)
            .map(|schema| schema.resolve(base))
            .ok_or_else(|| CoreError::UnknownJoinSchema {
                schema: name.to_owned(),
            })
    }

    /// Resolve a schema, then apply the override stored under
    /// `override_key` if there is one. A missing override is silent; a
    /// rejected one logs a warning and yields the compiled-in map.
    pub fn resolve_with_override(
        &self,
        name: &str,
        base: u32,
        override_key: Option<&str>,
        overrides: &IndexMap<String, Value>,
    ) -> Result<JoinMap, CoreError> {
        let map = self.resolve(name, base)?;
        let Some(key) = override_key else {
            return Ok(map);
        };
        let Some(payload) = overrides.get(key) else {
            debug!(schema = %name, join_map_key = %key, "no override configured; using default join map");
            return Ok(map);
        };
        match map.apply_override(key, payload) {
            Ok(overridden) => {
                debug!(schema = %name, join_map_key = %key, "join map override applied");
                Ok(overridden)
            }
            Err(e) => {
                warn!(schema = %name, error = %e, "using default join map");
                Ok(map)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn schema() -> JoinMapSchema {
        JoinMapSchema::new("test")
            .single("isOnline", 0, SignalKind::Boolean, "Online")
            .per_port("videoSync", 1, SignalKind::Boolean, "Sync per input")
            .per_port("outputRoute", 0, SignalKind::Numeric, "Route per output")
            .single("name", 0, SignalKind::Text, "Name")
            .single("identify", 50, SignalKind::Boolean, "Identify")
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = schema().resolve(100);
        let b = schema().resolve(100);
        for (field, _) in schema().fields() {
            assert_eq!(a.join(field), b.join(field));
        }
        assert_eq!(a.join("outputRoute"), Some(100));
    }

    #[test]
    fn per_port_joins_step_by_index() {
        let map = schema().resolve(10);
        assert_eq!(map.join_at("videoSync", 1), Some(11));
        assert_eq!(map.join_at("videoSync", 4), Some(14));
        assert_eq!(map.join_at("videoSync", 0), None);
        assert_eq!(map.join_at("isOnline", 2), None);
        assert_eq!(map.join("missing"), None);
    }

    #[test]
    fn equality_ignores_base() {
        assert_eq!(schema().resolve(1), schema().resolve(201));
    }

    #[test]
    fn override_keeps_unmentioned_fields() {
        let map = schema().resolve(100);
        let overridden = map
            .apply_override("custom", &json!({ "outputRoute": { "offset": 50 } }))
            .unwrap();

        assert_eq!(overridden.join("outputRoute"), Some(150));
        assert_eq!(overridden.join("isOnline"), map.join("isOnline"));
        assert_eq!(overridden.join_at("videoSync", 2), map.join_at("videoSync", 2));
        assert_eq!(overridden.base(), 100);
    }

    #[test]
    fn override_accepts_serialized_string() {
        let map = schema().resolve(1);
        let payload = Value::String(r#"{"name":{"joinNumber":5,"description":"Label"}}"#.into());
        let overridden = map.apply_override("custom", &payload).unwrap();

        assert_eq!(overridden.join("name"), Some(5));
        assert_eq!(overridden.field("name").unwrap().description, "Label");
    }

    #[test]
    fn join_number_is_one_based() {
        let map = schema().resolve(100);
        // joinNumber 1 is offset 0, already taken by isOnline.
        let collision = map
            .apply_override("custom", &json!({ "identify": { "joinNumber": 1 } }))
            .unwrap_err();
        assert!(matches!(collision, CoreError::JoinMapOverride { .. }));

        let moved = map
            .apply_override("custom", &json!({ "outputRoute": { "joinNumber": 11 } }))
            .unwrap();
        assert_eq!(moved.join("outputRoute"), Some(110));
        assert_eq!(moved.field("outputRoute").unwrap().offset, 10);
    }

    #[test]
    fn malformed_overrides_are_rejected_whole() {
        let map = schema().resolve(1);
        let cases = [
            json!({ "outputRoute": { "offset": 3 }, "bogus": { "offset": 1 } }),
            json!({ "outputRoute": { "offset": "three" } }),
            json!({ "outputRoute": { "offset": 3, "kind": "text" } }),
            json!({ "outputRoute": { "offst": 3 } }),
            json!({ "identify": { "offset": 0 } }),
            json!({ "outputRoute": { "joinNumber": 0 } }),
            json!({ "outputRoute": { "offset": 3, "joinNumber": 4 } }),
            Value::String("{not json".into()),
            json!([1, 2, 3]),
        ];
        for payload in cases {
            let result = map.apply_override("custom", &payload);
            assert!(
                matches!(result, Err(CoreError::JoinMapOverride { .. })),
                "accepted {payload}"
            );
        }
    }

    #[test]
    fn single_joins_of_different_kinds_may_share_offsets() {
        let map = schema().resolve(1);
        assert!(map.apply_override("custom", &json!({ "name": { "offset": 0 } })).is_ok());
    }

    #[test]
    fn catalog_falls_back_to_default_on_bad_override() {
        let mut catalog = JoinMapCatalog::new();
        catalog.register(schema());
        let mut overrides = IndexMap::new();
        overrides.insert("broken".to_owned(), json!({ "nope": {} }));
        overrides.insert("moved".to_owned(), json!({ "name": { "offset": 9 } }));

        let default = catalog.resolve("test", 100).unwrap();
        let fallback = catalog
            .resolve_with_override("test", 100, Some("broken"), &overrides)
            .unwrap();
        let absent = catalog
            .resolve_with_override("test", 100, Some("missing"), &overrides)
            .unwrap();
        let moved = catalog
            .resolve_with_override("test", 100, Some("moved"), &overrides)
            .unwrap();

        assert_eq!(fallback.entries(), default.entries());
        assert_eq!(absent.entries(), default.entries());
        assert_eq!(moved.join("name"), Some(109));
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let catalog = JoinMapCatalog::new();
        assert!(matches!(
            catalog.resolve("nope", 1),
            Err(CoreError::UnknownJoinSchema { .. })
        ));
    }

    #[test]
    fn entries_list_first_joins_in_order() {
        let entries = schema().resolve(100).entries();
        let rows: Vec<_> = entries.iter().map(|e| (e.field.as_str(), e.join)).collect();
        assert_eq!(
            rows,
            vec![
                ("isOnline", 100),
                ("videoSync", 101),
                ("outputRoute", 100),
                ("name", 100),
                ("identify", 150),
            ]
        );
    }
}
