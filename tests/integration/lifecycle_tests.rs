//! Operation lifecycle: events, cancellation, timeouts, admission

#[cfg(test)]
mod tests {
    use crate::common::fixtures::{self, create_policy, finish, run_to_end, vpc_records};
    use crate::common::{ScriptedAdapter, assert_totals};
    use chrono::Utc;
    use netinv_bulk::{
        BulkError, BulkEvent, BulkOperationEngine, BulkOperationRequest, EngineConfig, ErrorCode,
        OperationStatus, ResourceKind,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn slow_adapter(store: Arc<netinv_bulk::InventoryStore>) -> ScriptedAdapter {
        ScriptedAdapter::vpc(store).with_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_event_sequence_for_completed_operation() {
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(fixtures::store()));
        let mut events = engine.subscribe();

        let policy = create_policy().with_batch_size(2).with_max_concurrent(1);
        let result = run_to_end(&engine, policy, vpc_records(6)).await;
        let events = fixtures::drain_events(&mut events, &result.operation_id);

        assert!(matches!(events.first(), Some(BulkEvent::Queued { total_records: 6, .. })));
        assert!(matches!(events.get(1), Some(BulkEvent::Started { total_batches: 3, .. })));
        assert!(matches!(events.last(), Some(BulkEvent::Completed(_))));

        let batches = events
            .iter()
            .filter(|e| matches!(e, BulkEvent::BatchCompleted { .. }))
            .count();
        assert_eq!(batches, 3);

        let progress: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                BulkEvent::Progress(p) => Some(p.progress),
                _ => None,
            })
            .collect();
        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_cancel_twice_is_idempotent() {
        let engine = fixtures::engine_with(slow_adapter(fixtures::store()));
        let policy = create_policy().with_batch_size(5).with_max_concurrent(1);
        let id = engine
            .submit(BulkOperationRequest::new(policy, vpc_records(40)))
            .unwrap();

        fixtures::wait_for_successes(&engine, &id, 3).await;
        crate::assert_ok!(engine.cancel(&id));
        crate::assert_ok!(engine.cancel(&id));

        let result = finish(&engine, &id).await;
        assert_eq!(result.status, OperationStatus::Cancelled);
        assert!(result.successful_records >= 3);
        assert!(result.skipped_records > 0);
        assert_eq!(result.failure.as_ref().unwrap().code, ErrorCode::Cancelled);
        assert_totals(&result);

        crate::assert_ok!(engine.cancel(&id));
        assert_eq!(engine.get_progress(&id).unwrap().status, OperationStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_timeout_fails_operation() {
        let engine = fixtures::engine_with(slow_adapter(fixtures::store()));
        let policy = create_policy()
            .with_batch_size(5)
            .with_max_concurrent(1)
            .with_timeout(Duration::from_millis(60));

        let result = run_to_end(&engine, policy, vpc_records(50)).await;

        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(result.failure.as_ref().unwrap().code, ErrorCode::OperationTimeout);
        assert!(result.skipped_records > 0);
        assert_totals(&result);
    }

    #[tokio::test]
    async fn test_explicit_rollback_undoes_running_operation() {
        let store = fixtures::store();
        let engine = fixtures::engine_with(slow_adapter(store.clone()));
        let mut events = engine.subscribe();

        let policy = create_policy()
            .with_batch_size(4)
            .with_max_concurrent(1)
            .with_rollback(true);
        let id = engine
            .submit(BulkOperationRequest::new(policy, vpc_records(40)))
            .unwrap();

        fixtures::wait_for_successes(&engine, &id, 2).await;
        crate::assert_ok!(engine.rollback(&id));

        let result = finish(&engine, &id).await;
        assert_eq!(result.status, OperationStatus::RolledBack);
        assert!(result.rollback.unwrap().rollback_success);
        assert_eq!(store.count(ResourceKind::Vpc), 0);

        let names: Vec<_> = fixtures::drain_events(&mut events, &id)
            .iter()
            .map(BulkEvent::name)
            .collect();
        let tail = &names[names.len() - 3..];
        assert_eq!(tail, ["rollback:started", "rollback:completed", "operation:cancelled"]);

        let error = crate::assert_err!(engine.rollback(&id));
        assert!(matches!(error, BulkError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_admission_limit_keeps_second_operation_queued() {
        let engine = BulkOperationEngine::new(EngineConfig {
            max_active_operations: 1,
            ..EngineConfig::default()
        });
        engine.register_adapter(Arc::new(slow_adapter(fixtures::store())));

        let policy = create_policy().with_batch_size(2).with_max_concurrent(1);
        let first = engine
            .submit(BulkOperationRequest::new(policy.clone(), vpc_records(10)))
            .unwrap();
        let second = engine
            .submit(BulkOperationRequest::new(policy, vpc_records(2)))
            .unwrap();

        fixtures::wait_for_successes(&engine, &first, 1).await;
        assert_eq!(engine.get_progress(&second).unwrap().status, OperationStatus::Queued);

        let first = finish(&engine, &first).await;
        let second = finish(&engine, &second).await;
        assert_eq!(first.status, OperationStatus::Completed);
        assert_eq!(second.status, OperationStatus::Completed);
        assert!(second.started_at.unwrap() >= first.completed_at);
    }

    #[tokio::test]
    async fn test_scheduled_operation_waits_for_its_time() {
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(fixtures::store()));
        let at = Utc::now() + chrono::Duration::milliseconds(80);
        let id = engine
            .submit(BulkOperationRequest::new(create_policy(), vpc_records(2)).scheduled_for(at))
            .unwrap();

        assert_eq!(engine.get_progress(&id).unwrap().status, OperationStatus::Queued);

        let result = finish(&engine, &id).await;
        assert_eq!(result.status, OperationStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_scheduled_operation_before_it_starts() {
        let adapter = ScriptedAdapter::vpc(fixtures::store());
        let engine = fixtures::engine_with(adapter.clone());
        let at = Utc::now() + chrono::Duration::seconds(30);
        let id = engine
            .submit(BulkOperationRequest::new(create_policy(), vpc_records(4)).scheduled_for(at))
            .unwrap();

        crate::assert_ok!(engine.cancel(&id));

        let result = finish(&engine, &id).await;
        assert_eq!(result.status, OperationStatus::Cancelled);
        assert_eq!(result.skipped_records, 4);
        assert!(result.started_at.is_none());
        assert!(adapter.calls().is_empty());
        assert_totals(&result);
    }

    #[tokio::test]
    async fn test_running_operation_cannot_be_removed() {
        let engine = fixtures::engine_with(slow_adapter(fixtures::store()));
        let policy = create_policy().with_batch_size(2).with_max_concurrent(1);
        let id = engine
            .submit(BulkOperationRequest::new(policy, vpc_records(20)))
            .unwrap();

        fixtures::wait_for_successes(&engine, &id, 1).await;
        let error = crate::assert_err!(engine.remove(&id));
        assert!(matches!(error, BulkError::InvalidState(_)));

        crate::assert_ok!(engine.cancel(&id));
        finish(&engine, &id).await;
        crate::assert_ok!(engine.remove(&id));
    }

    #[tokio::test]
    async fn test_finished_operation_can_be_removed() {
        let engine = fixtures::engine_with(ScriptedAdapter::vpc(fixtures::store()));
        let result = run_to_end(&engine, create_policy(), vpc_records(3)).await;

        assert_eq!(engine.list_operations().len(), 1);
        let removed = crate::assert_ok!(engine.remove(&result.operation_id));
        assert_eq!(removed.operation_id, result.operation_id);
        assert!(engine.list_operations().is_empty());

        let error = crate::assert_err!(engine.get_progress(&result.operation_id));
        assert_eq!(error.code(), ErrorCode::NotFound);
    }
}
