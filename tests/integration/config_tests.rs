//! Configuration loading and submission-time policy checks

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, create_policy, run_to_end, vpc_records};
    use crate::common::ScriptedAdapter;
    use netinv_bulk::{
        BulkOperationConfig, BulkOperationEngine, BulkOperationRequest, Config, ErrorCode,
        NormalizeNames, OperationStatus, OperationType, RegionAllowList, ResourceKind,
    };
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_engine_runs_with_file_defaults() {
        let file = write_config(
            r#"
engine:
  max_active_operations: 1
  defaults:
    batchSize: 2
    maxConcurrent: 1
    continueOnError: false
    enableRollback: true
    retryDelayMs: 1
"#,
        );
        let config = Config::from_file(file.path()).await.unwrap();

        let store = fixtures::store();
        let engine = BulkOperationEngine::new(config.engine.clone());
        engine.register_adapter(Arc::new(ScriptedAdapter::vpc(store.clone()).fail_terminal("vpc3")));

        let policy =
            BulkOperationConfig::from_template(config.defaults(), OperationType::Create, "vpc");
        let result = run_to_end(&engine, policy, vpc_records(5)).await;

        assert_eq!(result.status, OperationStatus::RolledBack);
        assert_eq!(store.count(ResourceKind::Vpc), 0);

        let progress = engine.get_progress(&result.operation_id).unwrap();
        assert_eq!(progress.total_batches, 3);
    }

    #[tokio::test]
    async fn test_malformed_file_is_invalid_config() {
        let file = write_config("engine:\n  defaults:\n    rollbackPolicy: sometimes\n");
        let error = crate::assert_err!(Config::from_file(file.path()).await);
        assert_eq!(error.code(), ErrorCode::InvalidConfig);

        let file = write_config("engine:\n  max_active_operations: 0\n");
        let error = crate::assert_err!(Config::from_file(file.path()).await);
        assert_eq!(error.code(), ErrorCode::InvalidConfig);
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_config() {
        let error = crate::assert_err!(Config::from_file("/nonexistent/netinv-bulk.yaml").await);
        assert_eq!(error.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_submit_rejects_bad_policies() {
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(fixtures::store()));

        let cases = vec![
            create_policy().with_batch_size(0),
            create_policy().with_max_concurrent(0),
            BulkOperationConfig::new(OperationType::Create, "load_balancer"),
            create_policy().with_validator("no_such_validator"),
            create_policy().with_processor("no_such_processor"),
        ];
        for policy in cases {
            let error = crate::assert_err!(engine.submit(BulkOperationRequest::new(policy, vpc_records(1))));
            assert_eq!(error.code(), ErrorCode::InvalidConfig);
        }
        assert!(engine.list_operations().is_empty());
    }

    #[tokio::test]
    async fn test_request_deserializes_from_json() {
        let store = fixtures::store();
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(store.clone()));
        engine.register_validator(Arc::new(RegionAllowList::new(["eu-west-1"])));
        engine.register_processor(Arc::new(NormalizeNames));

        let request: BulkOperationRequest = serde_json::from_value(json!({
            "id": "import-42",
            "config": {
                "operationType": "create",
                "resourceType": "vpc",
                "batchSize": 10,
                "customValidators": ["allowed_regions"],
                "processors": ["normalize_names"],
            },
            "records": [
                { "data": { "name": "Edge", "cidr_block": "10.0.0.0/16", "region": "eu-west-1" } },
                { "data": { "name": "far", "cidr_block": "10.1.0.0/16", "region": "sa-east-1" } },
            ],
        }))
        .unwrap();

        let id = engine.submit(request).unwrap();
        assert_eq!(id, "import-42");

        let result = fixtures::finish(&engine, &id).await;
        assert_eq!(result.successful_records, 1);
        assert_eq!(result.skipped_records, 1);
        assert_eq!(result.errors[0].error_code, ErrorCode::ValidationFailed);

        let created = &result.created_resources[0].resource_id;
        assert_eq!(store.get(ResourceKind::Vpc, created).unwrap()["name"], "edge");
    }
}
