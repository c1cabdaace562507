//! In-memory network inventory
//!
//! Holds VPCs, subnets and gateways keyed by id and exposes one
//! `ResourceAdapter` per resource kind. Used by the `bulk-runner` binary and
//! the test suite.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::core::bulk::ledger::TransactionOperation;
use crate::core::bulk::types::{BulkRecord, MutationKind, OperationType};
use crate::core::traits::adapter::{AdapterError, AppliedMutation, ResourceAdapter};
use crate::core::traits::validator::ValidationResult;

/// Resource names: a letter followed by up to 62 letters, digits, `-` or `_`
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,62}$").unwrap_or_else(|e| {
        tracing::error!("Failed to compile resource name regex: {}", e);
        Regex::new(r"[^\s\S]").unwrap()
    })
});

const GATEWAY_TYPES: &[&str] = &["internet", "nat", "vpn", "transit"];

/// Kinds of network resources held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    Gateway,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Vpc, ResourceKind::Subnet, ResourceKind::Gateway];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Gateway => "gateway",
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Gateway => "gw",
        }
    }

    /// Fields a new resource of this kind must carry
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Vpc => &["name", "cidr_block", "region"],
            ResourceKind::Subnet => &["name", "cidr_block", "vpc_id", "availability_zone"],
            ResourceKind::Gateway => &["name", "gateway_type", "vpc_id"],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vpc" => Ok(ResourceKind::Vpc),
            "subnet" => Ok(ResourceKind::Subnet),
            "gateway" => Ok(ResourceKind::Gateway),
            other => Err(format!("Unknown resource type: {}", other)),
        }
    }
}

/// Thread-safe store of network resources
#[derive(Debug, Default)]
pub struct InventoryStore {
    resources: RwLock<HashMap<ResourceKind, BTreeMap<String, Value>>>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        self.resources
            .read()
            .get(&kind)
            .and_then(|resources| resources.get(id).cloned())
    }

    pub fn contains(&self, kind: ResourceKind, id: &str) -> bool {
        self.resources
            .read()
            .get(&kind)
            .is_some_and(|resources| resources.contains_key(id))
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.read().get(&kind).map_or(0, BTreeMap::len)
    }

    /// Every resource of `kind`, ordered by id
    pub fn all(&self, kind: ResourceKind) -> BTreeMap<String, Value> {
        self.resources
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Insert or replace a resource; returns the previous value
    pub fn insert(&self, kind: ResourceKind, id: impl Into<String>, value: Value) -> Option<Value> {
        self.resources
            .write()
            .entry(kind)
            .or_default()
            .insert(id.into(), value)
    }

    pub fn remove(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        self.resources
            .write()
            .get_mut(&kind)
            .and_then(|resources| resources.remove(id))
    }

    /// Seed resources from a JSON object keyed by kind, e.g.
    /// `{"vpc": [{"id": "vpc-1", "name": "core", ...}]}`
    pub fn seed(&self, seed: &Value) -> Result<usize, String> {
        let groups = seed
            .as_object()
            .ok_or_else(|| "Seed data must be an object keyed by resource type".to_string())?;

        let mut inserted = 0;
        for (kind, resources) in groups {
            let kind = ResourceKind::from_str(kind)?;
            let resources = resources
                .as_array()
                .ok_or_else(|| format!("Seed data for {} must be an array", kind))?;
            for resource in resources {
                let id = resource
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("Seeded {} is missing a string id", kind))?;
                self.insert(kind, id, resource.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// `ResourceAdapter` over one kind of the in-memory store
#[derive(Debug, Clone)]
pub struct InventoryAdapter {
    store: Arc<InventoryStore>,
    kind: ResourceKind,
}

impl InventoryAdapter {
    pub fn new(store: Arc<InventoryStore>, kind: ResourceKind) -> Self {
        Self { store, kind }
    }

    /// One adapter per resource kind, all sharing `store`
    pub fn for_all_kinds(store: &Arc<InventoryStore>) -> Vec<InventoryAdapter> {
        ResourceKind::ALL
            .iter()
            .map(|kind| InventoryAdapter::new(Arc::clone(store), *kind))
            .collect()
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    fn new_id(&self) -> String {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.kind.id_prefix(), &uuid[..12])
    }

    fn object<'a>(&self, data: &'a Value) -> Result<&'a Map<String, Value>, AdapterError> {
        data.as_object().ok_or_else(|| {
            AdapterError::terminal(format!("{} payload must be an object", self.kind))
                .with_code("INVALID_PAYLOAD")
        })
    }

    fn not_found(&self, id: &str) -> AdapterError {
        AdapterError::terminal(format!("{} {} not found", self.kind, id)).with_code("NOT_FOUND")
    }

    fn insert_new(&self, id: String, data: &Value) -> Result<AppliedMutation, AdapterError> {
        let mut resource = self.object(data)?.clone();
        resource.insert("id".to_string(), Value::String(id.clone()));
        let resource = Value::Object(resource);

        let mut resources = self.store.resources.write();
        let entries = resources.entry(self.kind).or_default();
        if entries.contains_key(&id) {
            return Err(
                AdapterError::terminal(format!("{} {} already exists", self.kind, id))
                    .with_code("CONFLICT"),
            );
        }
        entries.insert(id.clone(), resource.clone());
        debug!("Created {} {}", self.kind, id);
        Ok(AppliedMutation::created(id, resource))
    }

    fn merge_existing(&self, id: &str, data: &Value) -> Result<AppliedMutation, AdapterError> {
        let fields = self.object(data)?;

        let mut resources = self.store.resources.write();
        let current = resources
            .get_mut(&self.kind)
            .and_then(|entries| entries.get_mut(id))
            .ok_or_else(|| self.not_found(id))?;

        let original = current.clone();
        if let Value::Object(target) = current {
            for (key, value) in fields {
                if key != "id" {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        debug!("Updated {} {}", self.kind, id);
        Ok(AppliedMutation::updated(id, original, current.clone()))
    }

    fn check_fields(&self, fields: &Map<String, Value>, require_all: bool) -> ValidationResult {
        let mut result = ValidationResult::ok();

        if require_all {
            for field in self.kind.required_fields() {
                match fields.get(*field) {
                    Some(Value::String(value)) if !value.trim().is_empty() => {}
                    Some(Value::String(_)) | None | Some(Value::Null) => {
                        result = result.with_error(format!("{} is required", field));
                    }
                    Some(_) => {
                        result = result.with_error(format!("{} must be a string", field));
                    }
                }
            }
        }

        if let Some(name) = fields.get("name") {
            match name.as_str() {
                Some(name) if !NAME_PATTERN.is_match(name) => {
                    result = result.with_error(format!("name '{}' is not a valid resource name", name));
                }
                None if !require_all => {
                    result = result.with_error("name must be a string");
                }
                _ => {}
            }
        }

        if let Some(cidr) = fields.get("cidr_block").and_then(Value::as_str) {
            match parse_cidr(cidr) {
                Ok(prefix) if prefix < 16 => {
                    result = result.with_warning(format!(
                        "cidr_block {} is larger than a /16 and may not be routable",
                        cidr
                    ));
                }
                Ok(_) => {}
                Err(e) => result = result.with_error(e),
            }
        }

        if let Some(gateway_type) = fields.get("gateway_type").and_then(Value::as_str) {
            if !GATEWAY_TYPES.contains(&gateway_type) {
                result = result.with_error(format!(
                    "gateway_type must be one of {}",
                    GATEWAY_TYPES.join(", ")
                ));
            }
        }

        result
    }
}

#[async_trait]
impl ResourceAdapter for InventoryAdapter {
    fn resource_type(&self) -> &str {
        self.kind.as_str()
    }

    async fn create(&self, data: &Value) -> Result<AppliedMutation, AdapterError> {
        let id = match data.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => self.new_id(),
        };
        self.insert_new(id, data)
    }

    async fn update(&self, id: &str, data: &Value) -> Result<AppliedMutation, AdapterError> {
        self.merge_existing(id, data)
    }

    async fn delete(&self, id: &str) -> Result<AppliedMutation, AdapterError> {
        let original = self
            .store
            .remove(self.kind, id)
            .ok_or_else(|| self.not_found(id))?;
        debug!("Deleted {} {}", self.kind, id);
        Ok(AppliedMutation::deleted(id, original))
    }

    async fn upsert(
        &self,
        id: Option<&str>,
        data: &Value,
    ) -> Result<AppliedMutation, AdapterError> {
        match id {
            Some(id) if self.store.contains(self.kind, id) => self.merge_existing(id, data),
            Some(id) => self.insert_new(id.to_string(), data),
            None => self.create(data).await,
        }
    }

    async fn undo(&self, operation: &TransactionOperation) -> Result<(), AdapterError> {
        let id = operation.resource_id.as_str();
        match operation.operation_type {
            MutationKind::Create => {
                self.store
                    .remove(self.kind, id)
                    .ok_or_else(|| self.not_found(id))?;
            }
            MutationKind::Update => {
                let original = operation.original_data.clone().ok_or_else(|| {
                    AdapterError::terminal(format!("No pre-image recorded for {}", id))
                })?;
                if self.store.insert(self.kind, id, original).is_none() {
                    // The resource vanished after the update; restoring it is still correct
                    debug!("Restored missing {} {} from pre-image", self.kind, id);
                }
            }
            MutationKind::Delete => {
                let original = operation.original_data.clone().ok_or_else(|| {
                    AdapterError::terminal(format!("No pre-image recorded for {}", id))
                })?;
                let mut resources = self.store.resources.write();
                let entries = resources.entry(self.kind).or_default();
                if entries.contains_key(id) {
                    return Err(AdapterError::terminal(format!(
                        "{} {} was recreated before rollback",
                        self.kind, id
                    ))
                    .with_code("CONFLICT"));
                }
                entries.insert(id.to_string(), original);
            }
        }
        debug!("Undid {:?} of {} {}", operation.operation_type, self.kind, id);
        Ok(())
    }

    fn validate(&self, record: &BulkRecord, operation_type: OperationType) -> ValidationResult {
        if operation_type == OperationType::Delete {
            return ValidationResult::ok();
        }

        let Some(fields) = record.data.as_object() else {
            return ValidationResult::invalid(format!("{} payload must be an object", self.kind));
        };

        let require_all = match operation_type {
            OperationType::Create => true,
            OperationType::Upsert => record
                .id
                .as_deref()
                .is_none_or(|id| !self.store.contains(self.kind, id)),
            OperationType::Update | OperationType::Delete => false,
        };

        self.check_fields(fields, require_all)
    }
}

/// Parse `a.b.c.d/n` and return the prefix length
pub fn parse_cidr(cidr: &str) -> Result<u8, String> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("cidr_block '{}' is missing a prefix length", cidr))?;
    address
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("cidr_block '{}' has an invalid address", cidr))?;
    let prefix = prefix
        .parse::<u8>()
        .ok()
        .filter(|prefix| *prefix <= 32)
        .ok_or_else(|| format!("cidr_block '{}' has an invalid prefix length", cidr))?;
    Ok(prefix)
}
