// ==========================================
// 批次投料与关闭集成测试
// ==========================================
// 职责: 验证投料台账、签核、作废、来源校验与关闭判定
// ==========================================


#[cfg(test)]
mod batch_flow_test {
    use batch_execution::api::ApiError;
    use batch_execution::domain::{AdjustmentMaterial, BatchStatus, ConsumptionKind, NirsStatus};
    use batch_execution::engine::CloseBlocker;

    use crate::test_helpers::{approx, complete_batch, setup_env, start_first_batch};

    #[test]
    fn test_scaled_close_scenario() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        let reqs = env
            .state
            .recipe_api
            .scaled_requirements("R1", batch.target_weight)
            .unwrap();
        assert!(approx(reqs[0].required_quantity, 300.0));
        assert!(approx(reqs[1].required_quantity, 200.0));

        api.record_consumption(id, "A", "P-A", 300.0, "op1").unwrap();
        api.record_consumption(id, "B", "P-B", 199.0, "op1").unwrap();
        api.set_nirs(id, NirsStatus::Ok, "lab").unwrap();
        api.set_sampling_ok(id, "lab").unwrap();

        match api.request_close(id, "op1") {
            Err(ApiError::BatchCloseRejected(report)) => {
                assert_eq!(report.blockers.len(), 1);
                assert!(approx(report.shortfall_of("B").unwrap(), 1.0));
                assert!(report.shortfall_of("A").is_none());
                assert!(!report.has_quality_blocker());
            }
            other => panic!("Expected BatchCloseRejected, got {:?}", other),
        }
        assert_eq!(api.get_batch(id).unwrap().status, BatchStatus::Ongoing);

        api.record_consumption(id, "B", "P-B", 1.0, "op1").unwrap();
        let closed = api.request_close(id, "op1").unwrap();
        assert_eq!(closed.status, BatchStatus::Completed);
        assert!(closed.completed_at.is_some());

        // 已关闭批次不可再投料
        assert!(matches!(
            api.record_consumption(id, "A", "P-A", 1.0, "op1"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
    }

    #[test]
    fn test_close_reports_every_blocker() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;

        let report = api.close_eligibility(&batch.batch_id).unwrap();
        assert_eq!(report.blockers.len(), 4);
        assert!(report.blockers.contains(&CloseBlocker::NirsPending));
        assert!(report.blockers.contains(&CloseBlocker::SamplingPending));
        assert!(approx(report.shortfall_of("A").unwrap(), 300.0));
        assert!(approx(report.shortfall_of("B").unwrap(), 200.0));
    }

    #[test]
    fn test_query_surface() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        api.record_consumption(id, "A", "P-A", 120.0, "op1").unwrap();

        let effective = api.effective_consumption(id).unwrap();
        assert!(approx(effective["A"], 120.0));
        assert!(approx(effective["B"], 0.0));

        let shortfalls = api.shortfalls(id).unwrap();
        assert_eq!(shortfalls.len(), 2);
        assert_eq!(shortfalls[0].ingredient_name, "A");
        assert!(approx(shortfalls[0].shortfall, 180.0));
        assert!(approx(shortfalls[1].shortfall, 200.0));

        let summary = api.batch_summary(id).unwrap();
        assert_eq!(summary.batch_number, 1);
        assert_eq!(summary.ingredients.len(), 2);
        assert!(!summary.ingredients[0].within_tolerance);
        assert!(!summary.close_report.is_clear());
        assert!(summary.adjustments.is_empty());
    }

    #[test]
    fn test_negative_correction_cannot_drive_total_below_zero() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        api.record_consumption(id, "A", "P-A", 310.0, "op1").unwrap();
        api.record_consumption(id, "A", "P-A", -10.0, "op1").unwrap();
        assert!(approx(api.effective_consumption(id).unwrap()["A"], 300.0));

        assert!(matches!(
            api.record_consumption(id, "A", "P-A", -400.0, "op1"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert_eq!(api.get_batch(id).unwrap().ledger.len(), 2);
    }

    #[test]
    fn test_annul_reopens_signed_off_ingredient() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        let entry = api.record_consumption(id, "A", "P-A", 300.0, "op1").unwrap();
        api.set_weighing_finished(id, "A", true, "op1").unwrap();
        assert!(api.get_batch(id).unwrap().is_weighing_finished("A"));

        let annulled = api.annul(id, &entry.entry_id, "op1").unwrap();
        assert!(annulled.is_annulled);

        let stored = api.get_batch(id).unwrap();
        assert!(!stored.is_weighing_finished("A"));
        assert_eq!(stored.ledger.len(), 1);
        assert!(stored.ledger.entries()[0].is_annulled);
        assert!(approx(stored.ledger.effective_quantity("A"), 0.0));

        // 重复作废
        assert!(matches!(
            api.annul(id, &entry.entry_id, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.annul(id, "missing-entry", "op1"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_sign_off_is_independent_of_tolerance() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        api.record_consumption(id, "B", "P-B", 150.0, "op1").unwrap();
        api.set_weighing_finished(id, "B", true, "op1").unwrap();

        let progress = api.ingredient_progress(id).unwrap();
        let b = progress.iter().find(|p| p.ingredient_name == "B").unwrap();
        assert!(b.weighing_finished);
        assert!(!b.within_tolerance);

        assert!(matches!(
            api.set_weighing_finished(id, "Z", true, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_source_material_validation() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        assert!(matches!(
            api.record_consumption(id, "A", "P-UNKNOWN", 10.0, "op1"),
            Err(ApiError::External(_))
        ));
        assert!(matches!(
            api.record_consumption(id, "A", "P-BLOCKED", 10.0, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.record_consumption(id, "A", "P-SMALL", 10.0, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.record_consumption(id, "A", "P-A", 0.0, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.record_consumption(id, "Z", "P-A", 1.0, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(api.get_batch(id).unwrap().ledger.is_empty());

        let entry = api.record_consumption(id, "A", "P-SMALL", 5.0, "op1").unwrap();
        assert_eq!(entry.kind, ConsumptionKind::Manual);
        assert_eq!(entry.recorded_by, "op1");
    }

    #[test]
    fn test_source_draws_accumulate_across_entries() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        // P-SMALL 入库 5kg, 分次领用合计不得超出
        let first = api.record_consumption(id, "A", "P-SMALL", 3.0, "op1").unwrap();
        api.record_consumption(id, "A", "P-SMALL", 2.0, "op1").unwrap();
        assert!(matches!(
            api.record_consumption(id, "A", "P-SMALL", 1.0, "op1"),
            Err(ApiError::InvalidInput(_))
        ));
        assert_eq!(api.get_batch(id).unwrap().ledger.len(), 2);

        // 作废后释放可用量
        api.annul(id, &first.entry_id, "op1").unwrap();
        api.record_consumption(id, "A", "P-SMALL", 3.0, "op1").unwrap();
        assert!(matches!(
            api.record_consumption(id, "A", "P-SMALL", 0.5, "op1"),
            Err(ApiError::InvalidInput(_))
        ));

        // 负向更正归还物料
        api.record_consumption(id, "A", "P-SMALL", -1.0, "op1").unwrap();
        api.record_consumption(id, "A", "P-SMALL", 1.0, "op1").unwrap();
        assert!(approx(api.effective_consumption(id).unwrap()["A"], 5.0));
    }

    #[test]
    fn test_quality_fields_are_set_once() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        api.set_nirs(id, NirsStatus::Ok, "lab").unwrap();
        assert!(matches!(
            api.set_nirs(id, NirsStatus::Nok, "lab"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert!(matches!(
            api.set_nirs(id, NirsStatus::Pending, "lab"),
            Err(ApiError::InvalidInput(_))
        ));

        api.set_sampling_ok(id, "lab").unwrap();
        assert!(matches!(
            api.set_sampling_ok(id, "lab"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
    }

    #[test]
    fn test_commands_on_planned_batch_are_rejected() {
        let env = setup_env();
        let (run, first) = start_first_batch(&env, 1000.0, 500.0);
        let second = env.state.run_api.get_run(&run.run_id).unwrap().batches[1].clone();
        assert_eq!(second.status, BatchStatus::Planned);

        assert!(matches!(
            env.state
                .batch_api
                .record_consumption(&second.batch_id, "A", "P-A", 1.0, "op1"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        // 未启动的批次不接受质量结果与纠偏工单
        assert!(matches!(
            env.state
                .batch_api
                .set_nirs(&second.batch_id, NirsStatus::Nok, "lab"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert!(matches!(
            env.state.batch_api.set_sampling_ok(&second.batch_id, "lab"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert!(matches!(
            env.state.adjustment_api.create(
                &second.batch_id,
                vec![AdjustmentMaterial::new("A", 5.0, "P-ADJ")],
                "qa"
            ),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        assert!(matches!(
            env.state.batch_api.get_batch("missing"),
            Err(ApiError::NotFound(_))
        ));

        // 启动后质量字段仍为初始值
        complete_batch(&env, &first);
        let started = env.state.run_api.start_next_batch(&run.run_id, "planner").unwrap();
        assert_eq!(started.batch_id, second.batch_id);
        let stored = env.state.batch_api.get_batch(&second.batch_id).unwrap();
        assert_eq!(stored.status, BatchStatus::Ongoing);
        assert_eq!(stored.confirmation.nirs, NirsStatus::Pending);
        assert_eq!(stored.confirmation.nirs_sequence, 0);
        assert!(env
            .state
            .adjustment_api
            .list_by_batch(&second.batch_id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_accepted_commands_are_audited() {
        let env = setup_env();
        let (run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api = &env.state.batch_api;
        let id = batch.batch_id.as_str();

        let entry = api.record_consumption(id, "A", "P-A", 300.0, "op1").unwrap();
        api.annul(id, &entry.entry_id, "op2").unwrap();
        // 被拒绝的命令不记录
        let _ = api.record_consumption(id, "A", "P-BLOCKED", 1.0, "op1");

        let history = api.action_history(id).unwrap();
        let types: Vec<&str> = history.iter().map(|l| l.action_type.as_str()).collect();
        assert_eq!(types, vec!["StartBatch", "RecordConsumption", "AnnulConsumption"]);
        assert_eq!(history[2].actor, "op2");
        assert_eq!(history[1].run_id.as_deref(), Some(run.run_id.as_str()));
    }
}
