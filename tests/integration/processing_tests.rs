//! Batching, concurrency, retry and validation behavior

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, create_policy, run_to_end, vpc_records};
    use crate::common::{ScriptedAdapter, assert_totals};
    use netinv_bulk::{
        BulkEvent, BulkOperationRequest, BulkRecord, ErrorCode, OperationStatus, OperationType,
        RecordProcessor, ResourceKind, TransactionStatus,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Rejects records carrying a reserved name
    struct ReservedNames;

    impl RecordProcessor for ReservedNames {
        fn name(&self) -> &str {
            "reserved_names"
        }

        fn process(
            &self,
            record: BulkRecord,
            _operation_type: OperationType,
        ) -> Result<BulkRecord, String> {
            match record.data.get("name").and_then(|v| v.as_str()) {
                Some("vpc1") => Err("name vpc1 is reserved".to_string()),
                _ => Ok(record),
            }
        }
    }

    #[tokio::test]
    async fn test_ten_records_three_per_batch() {
        let store = fixtures::store();
        let adapter = ScriptedAdapter::vpc(store.clone());
        let engine = fixtures::engine_with(adapter);

        let policy = create_policy().with_batch_size(3).with_max_concurrent(3);
        let result = run_to_end(&engine, policy, vpc_records(10)).await;

        assert_eq!(result.status, OperationStatus::Completed);
        assert!(result.success);
        assert_eq!(result.processed_records, 10);
        assert_eq!(result.successful_records, 10);
        assert_totals(&result);

        let progress = engine.get_progress(&result.operation_id).unwrap();
        assert_eq!(progress.total_batches, 4);

        let ledger = engine.transaction(&result.operation_id).unwrap();
        assert_eq!(ledger.operations.len(), 10);
        assert_eq!(ledger.status, TransactionStatus::Committed);
        assert_eq!(store.count(ResourceKind::Vpc), 10);
    }

    #[tokio::test]
    async fn test_single_record_makes_one_batch() {
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(fixtures::store()));
        let mut events = engine.subscribe();

        let result = run_to_end(&engine, create_policy().with_batch_size(1), vpc_records(1)).await;

        let events = fixtures::drain_events(&mut events, &result.operation_id);
        let batches: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                BulkEvent::BatchCompleted { batch_index, .. } => Some(*batch_index),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![0]);
        assert_eq!(result.successful_records, 1);
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(fixtures::store()));
        let error = crate::assert_err!(engine.submit(BulkOperationRequest::new(create_policy(), vec![])));
        assert_eq!(error.code(), ErrorCode::EmptyBatch);
    }

    #[tokio::test]
    async fn test_totals_hold_with_mixed_outcomes() {
        let adapter = ScriptedAdapter::vpc(fixtures::store())
            .fail_terminal("vpc1")
            .fail_retryable("vpc4", 1)
            .fail_retryable("vpc6", 10);
        let engine = fixtures::engine_with(adapter);

        let mut records = vpc_records(8);
        records[3] = BulkRecord::new(json!({ "name": "no-cidr", "region": "eu-west-1" }));

        let policy = create_policy()
            .with_batch_size(3)
            .with_max_concurrent(2)
            .with_retry_attempts(2);
        let result = run_to_end(&engine, policy, records).await;

        assert_eq!(result.status, OperationStatus::Completed);
        assert!(!result.success);
        assert_eq!(result.successful_records, 5);
        assert_eq!(result.failed_records, 2);
        assert_eq!(result.skipped_records, 1);
        assert_totals(&result);
    }

    #[tokio::test]
    async fn test_retry_boundary_counts_as_success() {
        let adapter = ScriptedAdapter::vpc(fixtures::store()).fail_retryable("vpc0", 3);
        let engine = fixtures::engine_with(adapter.clone());

        let result = run_to_end(&engine, create_policy().with_retry_attempts(3), vpc_records(1)).await;

        assert!(result.success);
        assert_eq!(result.successful_records, 1);
        assert_eq!(result.failed_records, 0);
        assert!(result.errors.is_empty());
        assert_eq!(adapter.attempts("vpc0"), 4);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_records_retry_count() {
        let adapter = ScriptedAdapter::vpc(fixtures::store()).fail_retryable("vpc0", 4);
        let engine = fixtures::engine_with(adapter.clone());

        let result = run_to_end(&engine, create_policy().with_retry_attempts(3), vpc_records(1)).await;

        assert_eq!(result.failed_records, 1);
        assert_eq!(result.errors[0].retry_count, 3);
        assert_eq!(result.errors[0].error_code, ErrorCode::ResourceAdapterError);
        assert_eq!(adapter.attempts("vpc0"), 4);
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_rest() {
        let adapter = ScriptedAdapter::vpc(fixtures::store()).fail_terminal("vpc2");
        let engine = fixtures::engine_with(adapter.clone());

        let policy = create_policy()
            .with_batch_size(2)
            .with_max_concurrent(1)
            .with_continue_on_error(false);
        let result = run_to_end(&engine, policy, vpc_records(5)).await;

        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(adapter.calls(), vec!["vpc0", "vpc1", "vpc2"]);
        assert_eq!(result.successful_records, 2);
        assert_eq!(result.failed_records, 1);
        assert_eq!(result.skipped_records, 2);
        assert_totals(&result);

        let failure = result.failure.unwrap();
        assert_eq!(failure.code, ErrorCode::ResourceAdapterError);
        assert!(failure.message.contains("record 2"));
    }

    #[tokio::test]
    async fn test_stop_on_error_drains_running_batches() {
        let store = fixtures::store();
        let adapter = ScriptedAdapter::vpc(store.clone())
            .with_delay(Duration::from_millis(10))
            .delay_key("vpc0", Duration::ZERO)
            .fail_terminal("vpc0");
        let engine = fixtures::engine_with(adapter.clone());

        let policy = create_policy()
            .with_batch_size(3)
            .with_max_concurrent(2)
            .with_continue_on_error(false);
        let result = run_to_end(&engine, policy, vpc_records(9)).await;

        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(result.failure.as_ref().unwrap().code, ErrorCode::ResourceAdapterError);

        // The second batch was already running and finishes every record
        for key in ["vpc3", "vpc4", "vpc5"] {
            assert_eq!(adapter.attempts(key), 1, "{} was not attempted", key);
        }
        // The rest of the failing batch and the undispatched batch never run
        for key in ["vpc1", "vpc2", "vpc6", "vpc7", "vpc8"] {
            assert_eq!(adapter.attempts(key), 0, "{} was attempted", key);
        }

        assert_eq!(result.successful_records, 3);
        assert_eq!(result.failed_records, 1);
        assert_eq!(result.skipped_records, 5);
        assert_eq!(store.count(ResourceKind::Vpc), 3);
        assert_totals(&result);
    }

    #[tokio::test]
    async fn test_processor_rejection_reports_validation_code() {
        let adapter = ScriptedAdapter::vpc(fixtures::store());
        let engine = fixtures::engine_with(adapter.clone());
        engine.register_processor(Arc::new(ReservedNames));

        let policy = create_policy()
            .with_batch_size(2)
            .with_max_concurrent(1)
            .with_continue_on_error(false)
            .with_processor("reserved_names");
        let result = run_to_end(&engine, policy, vpc_records(4)).await;

        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(result.failed_records, 1);
        assert_eq!(result.errors[0].error_code, ErrorCode::ValidationFailed);
        assert_eq!(adapter.calls(), vec!["vpc0"]);
        assert_totals(&result);

        let failure = result.failure.unwrap();
        assert_eq!(failure.code, ErrorCode::ValidationFailed);
        assert!(failure.message.contains("record 1"));
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_max_concurrent() {
        let adapter =
            ScriptedAdapter::vpc(fixtures::store()).with_delay(Duration::from_millis(5));
        let engine = fixtures::engine_with(adapter.clone());

        let policy = create_policy().with_batch_size(2).with_max_concurrent(3);
        let result = run_to_end(&engine, policy, vpc_records(18)).await;

        assert!(result.success);
        assert!(adapter.peak_in_flight() <= 3);
        assert!(adapter.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_need_ids() {
        let store = fixtures::seeded_store(2);
        let adapter = ScriptedAdapter::vpc(store.clone());
        let engine = fixtures::engine_with(adapter.clone());

        let records = vec![
            BulkRecord::with_id("vpc-seed-0", json!({ "region": "eu-north-1" })),
            BulkRecord::new(json!({ "region": "eu-north-1" })),
        ];
        let result = run_to_end(&engine, fixtures::policy(OperationType::Update), records).await;

        assert_eq!(result.successful_records, 1);
        assert_eq!(result.skipped_records, 1);
        assert_eq!(result.updated_resources[0].resource_id, "vpc-seed-0");
        assert_eq!(store.get(ResourceKind::Vpc, "vpc-seed-0").unwrap()["region"], "eu-north-1");

        let result = run_to_end(
            &engine,
            fixtures::policy(OperationType::Delete),
            vec![BulkRecord::with_id("vpc-seed-1", json!(null))],
        )
        .await;
        assert!(result.success);
        assert_eq!(result.deleted_resources[0].resource_id, "vpc-seed-1");
        assert_eq!(store.count(ResourceKind::Vpc), 1);
    }

    #[tokio::test]
    async fn test_upsert_reports_created_and_updated() {
        let store = fixtures::seeded_store(1);
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(store.clone()));

        let records = vec![
            BulkRecord::with_id("vpc-seed-0", json!({ "name": "renamed" })),
            BulkRecord::new(json!({ "name": "fresh", "cidr_block": "10.9.0.0/16", "region": "eu-west-1" })),
        ];
        let result = run_to_end(&engine, fixtures::policy(OperationType::Upsert), records).await;

        assert!(result.success);
        assert_eq!(result.updated_resources.len(), 1);
        assert_eq!(result.created_resources.len(), 1);
        assert_eq!(result.created_resources[0].record_index, 1);
        assert_eq!(store.count(ResourceKind::Vpc), 2);
    }
}
