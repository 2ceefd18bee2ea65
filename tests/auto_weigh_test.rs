// ==========================================
// 自动称重集成测试
// ==========================================
// 职责: 启停控制环、与人工投料互斥、失败释放标记
// ==========================================


#[cfg(test)]
mod auto_weigh_test {
    use std::time::Duration;

    use batch_execution::api::ApiError;
    use batch_execution::domain::ConsumptionKind;
    use batch_execution::engine::AutoWeighStop;

    use crate::test_helpers::{approx, setup_env, setup_env_with, start_first_batch};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_auto_weigh_finishes_every_ingredient() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let auto = &env.state.auto_weigh_api;

        auto.enable(&batch.batch_id, "auto").unwrap();
        let report = auto.wait(&batch.batch_id).await.unwrap().unwrap();

        assert_eq!(report.stop, AutoWeighStop::AllFinished);
        assert_eq!(report.processed, vec!["A".to_string(), "B".to_string()]);
        assert!(!auto.is_running(&batch.batch_id));

        let stored = env.state.batch_api.get_batch(&batch.batch_id).unwrap();
        assert!(stored.is_weighing_finished("A") && stored.is_weighing_finished("B"));
        assert!(stored
            .ledger
            .entries()
            .iter()
            .all(|e| e.kind == ConsumptionKind::Auto && e.source_reference == "AUTO-SCALE"));
        assert!(approx(stored.ledger.effective_quantity("A"), 300.0));
        assert!(approx(stored.ledger.effective_quantity("B"), 200.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disable_mid_wait_writes_nothing_then_resumes() {
        let env = setup_env_with(200, "AUTO-SCALE");
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let auto = &env.state.auto_weigh_api;
        let id = batch.batch_id.as_str();

        auto.enable(id, "auto").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(auto.is_running(id));

        let report = auto.disable(id).await.unwrap().unwrap();
        assert_eq!(report.stop, AutoWeighStop::Disabled);
        assert!(report.processed.is_empty());
        assert!(env.state.batch_api.get_batch(id).unwrap().ledger.is_empty());

        // 标记已释放, 人工可立即接管
        env.state
            .batch_api
            .set_weighing_finished(id, "A", false, "op")
            .unwrap();

        auto.enable(id, "auto").unwrap();
        let report = auto.wait(id).await.unwrap().unwrap();
        assert_eq!(report.stop, AutoWeighStop::AllFinished);
        assert_eq!(report.processed, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_manual_entry_excluded_while_auto_holds_ingredient() {
        let env = setup_env_with(200, "AUTO-SCALE");
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let auto = &env.state.auto_weigh_api;
        let batches = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        auto.enable(id, "auto").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        match batches.record_consumption(id, "A", "P-A", 10.0, "op") {
            Err(ApiError::IngredientBusy {
                batch_id,
                ingredient_name,
            }) => {
                assert_eq!(batch_id, id);
                assert_eq!(ingredient_name, "A");
            }
            other => panic!("Expected IngredientBusy, got {:?}", other),
        }
        // 其他配料不受影响
        batches.record_consumption(id, "B", "P-B", 200.0, "op").unwrap();

        let report = auto.wait(id).await.unwrap().unwrap();
        assert_eq!(report.stop, AutoWeighStop::AllFinished);

        // B 已由人工投满, 控制环只签核不再记账
        let stored = batches.get_batch(id).unwrap();
        assert!(approx(stored.ledger.effective_quantity("A"), 300.0));
        assert!(approx(stored.ledger.effective_quantity("B"), 200.0));
        assert_eq!(stored.ledger.len(), 2);
        assert!(stored.is_weighing_finished("B"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_enable_rules() {
        let env = setup_env_with(200, "AUTO-SCALE");
        let (run, batch) = start_first_batch(&env, 1000.0, 500.0);
        let auto = &env.state.auto_weigh_api;
        let planned = env.state.run_api.get_run(&run.run_id).unwrap().batches[1].clone();

        assert!(matches!(
            auto.enable(&planned.batch_id, "auto"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert!(matches!(
            auto.enable("missing", "auto"),
            Err(ApiError::NotFound(_))
        ));

        auto.enable(&batch.batch_id, "auto").unwrap();
        assert!(matches!(
            auto.enable(&batch.batch_id, "auto"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert!(auto.disable(&batch.batch_id).await.unwrap().is_some());

        assert!(auto.disable(&batch.batch_id).await.unwrap().is_none());
        assert!(auto.wait(&planned.batch_id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_step_releases_marker() {
        // 记账批号被冻结, 投料失败
        let env = setup_env_with(20, "P-BLOCKED");
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let auto = &env.state.auto_weigh_api;
        let id = batch.batch_id.as_str();

        auto.enable(id, "auto").unwrap();
        let report = auto.wait(id).await.unwrap().unwrap();
        assert!(matches!(report.stop, AutoWeighStop::Failed(_)));
        assert!(report.processed.is_empty());

        let stored = env.state.batch_api.get_batch(id).unwrap();
        assert!(stored.ledger.is_empty());
        assert!(!stored.is_weighing_finished("A"));

        env.state
            .batch_api
            .record_consumption(id, "A", "P-A", 300.0, "op")
            .unwrap();
    }

    #[test]
    fn test_enable_requires_runtime() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        assert!(matches!(
            env.state.auto_weigh_api.enable(&batch.batch_id, "auto"),
            Err(ApiError::InternalError(_))
        ));
    }
}
