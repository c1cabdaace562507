//! Stock validators and processors for inventory records

use serde_json::Value;
use std::collections::HashSet;

use crate::core::bulk::types::{BulkRecord, OperationType};
use crate::core::traits::validator::{RecordProcessor, RecordValidator, ValidationResult};

/// Rejects records whose `region` is not in the allow list
#[derive(Debug, Clone)]
pub struct RegionAllowList {
    regions: HashSet<String>,
}

impl RegionAllowList {
    pub const NAME: &'static str = "allowed_regions";

    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regions: regions.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordValidator for RegionAllowList {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn validate(&self, record: &BulkRecord, _operation_type: OperationType) -> ValidationResult {
        match record.data.get("region").and_then(Value::as_str) {
            Some(region) if !self.regions.contains(region) => {
                ValidationResult::invalid(format!("region {} is not allowed", region))
            }
            _ => ValidationResult::ok(),
        }
    }
}

/// Trims and lowercases `name`, and strips whitespace from `cidr_block`
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeNames;

impl NormalizeNames {
    pub const NAME: &'static str = "normalize_names";
}

impl RecordProcessor for NormalizeNames {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(
        &self,
        mut record: BulkRecord,
        _operation_type: OperationType,
    ) -> Result<BulkRecord, String> {
        let Some(fields) = record.data.as_object_mut() else {
            return Ok(record);
        };

        if let Some(name) = fields.get_mut("name") {
            let normalized = name
                .as_str()
                .map(|name| name.trim().to_lowercase())
                .ok_or_else(|| "name is not a string".to_string())?;
            if normalized.is_empty() {
                return Err("name is blank".to_string());
            }
            *name = Value::String(normalized);
        }

        if let Some(Value::String(cidr)) = fields.get_mut("cidr_block") {
            cidr.retain(|c| !c.is_whitespace());
        }

        Ok(record)
    }
}
