// ==========================================
// 纠偏工单集成测试
// ==========================================
// 职责: NIRS 不合格 → 纠偏工单 → 合并投料 → 批次放行
// ==========================================


#[cfg(test)]
mod adjustment_flow_test {
    use batch_execution::api::ApiError;
    use batch_execution::domain::{
        AdjustmentMaterial, AdjustmentStatus, Batch, BatchStatus, ConsumptionKind, NirsStatus,
        SourceMaterial,
    };
    use batch_execution::engine::CloseBlocker;

    use crate::test_helpers::{approx, setup_env, start_first_batch, TestEnv};

    /// 投满配方、已取样、NIRS 不合格的批次
    fn rejected_batch(env: &TestEnv) -> Batch {
        let (_run, batch) = start_first_batch(env, 500.0, 500.0);
        let api = &env.state.batch_api;
        api.record_consumption(&batch.batch_id, "A", "P-A", 300.0, "op").unwrap();
        api.record_consumption(&batch.batch_id, "B", "P-B", 200.0, "op").unwrap();
        api.set_sampling_ok(&batch.batch_id, "lab").unwrap();
        api.set_nirs(&batch.batch_id, NirsStatus::Nok, "lab").unwrap();
        batch
    }

    #[test]
    fn test_nok_blocks_close_until_adjustment_completes() {
        let env = setup_env();
        let batch = rejected_batch(&env);
        let id = batch.batch_id.as_str();
        let batches = &env.state.batch_api;
        let adjustments = &env.state.adjustment_api;

        match batches.request_close(id, "op") {
            Err(ApiError::BatchCloseRejected(report)) => {
                assert_eq!(
                    report.blockers,
                    vec![CloseBlocker::NirsRejected {
                        nirs: NirsStatus::Nok,
                        active_adjustment_id: None,
                    }]
                );
            }
            other => panic!("Expected BatchCloseRejected, got {:?}", other),
        }

        let order = adjustments
            .create(id, vec![AdjustmentMaterial::new("A", 5.0, "P-ADJ")], "qa")
            .unwrap();
        assert_eq!(order.status, AdjustmentStatus::Planned);
        assert_eq!(order.nirs_sequence, 1);

        // 每批次至多一张未终结工单
        assert!(matches!(
            adjustments.create(id, vec![AdjustmentMaterial::new("B", 1.0, "P-B")], "qa"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        // 未备齐不可合并
        assert!(matches!(
            adjustments.consume(&order.adjustment_id, "op"),
            Err(ApiError::InvalidStateTransition { .. })
        ));

        adjustments
            .assign_staging(&order.adjustment_id, "BIN-1", "wh")
            .unwrap();
        // 超量拣料被拒绝, 状态不变
        assert!(matches!(
            adjustments.pick(&order.adjustment_id, 0, 6.0, "wh"),
            Err(ApiError::InvalidInput(_))
        ));
        let stored = adjustments.get(&order.adjustment_id).unwrap();
        assert_eq!(stored.status, AdjustmentStatus::MaterialPicking);
        assert!(approx(stored.materials[0].picked_quantity, 0.0));

        let picked = adjustments.pick(&order.adjustment_id, 0, 5.0, "wh").unwrap();
        assert_eq!(picked.status, AdjustmentStatus::Processing);

        // 工单未完成: 仍被阻断, 原因中带工单号
        let report = batches.close_eligibility(id).unwrap();
        assert_eq!(
            report.blockers,
            vec![CloseBlocker::NirsRejected {
                nirs: NirsStatus::Nok,
                active_adjustment_id: Some(order.adjustment_id.clone()),
            }]
        );

        let entries = adjustments.consume(&order.adjustment_id, "op").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ConsumptionKind::Adjustment);
        assert_eq!(
            entries[0].adjustment_id.as_deref(),
            Some(order.adjustment_id.as_str())
        );
        assert!(approx(
            batches.effective_consumption(id).unwrap()["A"],
            305.0
        ));

        let closed = batches.request_close(id, "op").unwrap();
        assert_eq!(closed.status, BatchStatus::Completed);
        // 原始化验结果保留
        assert_eq!(closed.confirmation.nirs, NirsStatus::Nok);

        let history = adjustments.list_by_batch(id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_completed());
    }

    #[test]
    fn test_retest_after_healing() {
        let env = setup_env();
        let batch = rejected_batch(&env);
        let id = batch.batch_id.as_str();
        let adjustments = &env.state.adjustment_api;

        let order = adjustments
            .create(id, vec![AdjustmentMaterial::new("B", 2.0, "P-B")], "qa")
            .unwrap();
        adjustments.assign_staging(&order.adjustment_id, "BIN-2", "wh").unwrap();
        adjustments.pick(&order.adjustment_id, 0, 2.0, "wh").unwrap();
        adjustments.consume(&order.adjustment_id, "op").unwrap();

        // 已治愈的结果不可再开工单, 但允许复检
        assert!(matches!(
            adjustments.create(id, vec![AdjustmentMaterial::new("B", 1.0, "P-B")], "qa"),
            Err(ApiError::BusinessRuleViolation(_))
        ));
        env.state.batch_api.set_nirs(id, NirsStatus::Nok, "lab").unwrap();

        let stored = env.state.batch_api.get_batch(id).unwrap();
        assert_eq!(stored.confirmation.nirs_sequence, 2);
        // 复检不合格后旧工单不再治愈
        assert!(env
            .state
            .batch_api
            .close_eligibility(id)
            .unwrap()
            .has_quality_blocker());

        let second = adjustments
            .create(id, vec![AdjustmentMaterial::new("B", 1.0, "P-B")], "qa")
            .unwrap();
        assert_eq!(second.nirs_sequence, 2);
    }

    #[test]
    fn test_cancel_from_non_terminal_state() {
        let env = setup_env();
        let batch = rejected_batch(&env);
        let id = batch.batch_id.as_str();
        let adjustments = &env.state.adjustment_api;

        let order = adjustments
            .create(id, vec![AdjustmentMaterial::new("A", 5.0, "P-ADJ")], "qa")
            .unwrap();
        adjustments.assign_staging(&order.adjustment_id, "BIN-1", "wh").unwrap();

        let cancelled = adjustments.cancel(&order.adjustment_id, "qa").unwrap();
        assert_eq!(cancelled.status, AdjustmentStatus::Cancelled);
        assert!(matches!(
            adjustments.cancel(&order.adjustment_id, "qa"),
            Err(ApiError::InvalidStateTransition { .. })
        ));

        // 取消不产生投料, 批次仍被阻断
        assert!(approx(
            env.state.batch_api.effective_consumption(id).unwrap()["A"],
            300.0
        ));
        assert!(env.state.batch_api.request_close(id, "op").is_err());

        // 取消后可重新创建
        assert!(adjustments
            .create(id, vec![AdjustmentMaterial::new("A", 5.0, "P-ADJ")], "qa")
            .is_ok());
    }

    #[test]
    fn test_adjustment_sources_are_validated() {
        let env = setup_env();
        let batch = rejected_batch(&env);
        let id = batch.batch_id.as_str();
        let adjustments = &env.state.adjustment_api;

        assert!(matches!(
            adjustments.create(id, vec![AdjustmentMaterial::new("A", 5.0, "P-BLOCKED")], "qa"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            adjustments.create(id, vec![AdjustmentMaterial::new("B", 3.0, "NO-SUCH-PALLET")], "qa"),
            Err(ApiError::External(_))
        ));
        // 同一批号多行按合计校验: 3 + 3 > 5
        assert!(matches!(
            adjustments.create(
                id,
                vec![
                    AdjustmentMaterial::new("A", 3.0, "P-SMALL"),
                    AdjustmentMaterial::new("B", 3.0, "P-SMALL"),
                ],
                "qa"
            ),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(adjustments.list_by_batch(id).unwrap().is_empty());

        let order = adjustments
            .create(id, vec![AdjustmentMaterial::new("A", 5.0, "P-ADJ")], "qa")
            .unwrap();
        adjustments.assign_staging(&order.adjustment_id, "BIN-1", "wh").unwrap();
        adjustments.pick(&order.adjustment_id, 0, 5.0, "wh").unwrap();

        // 拣料后批号被冻结: 合并被拒绝, 工单与台账不变
        let frozen = |blocked: bool| SourceMaterial {
            source_reference: "P-ADJ".to_string(),
            material_name: "A".to_string(),
            available_quantity: 1_000.0,
            blocked,
            location: Some("WH-1".to_string()),
        };
        env.state.source_material_repo.upsert(&frozen(true)).unwrap();
        assert!(matches!(
            adjustments.consume(&order.adjustment_id, "op"),
            Err(ApiError::InvalidInput(_))
        ));
        assert_eq!(
            adjustments.get(&order.adjustment_id).unwrap().status,
            AdjustmentStatus::Processing
        );
        let stored = env.state.batch_api.get_batch(id).unwrap();
        assert_eq!(stored.ledger.len(), 2);
        assert!(approx(stored.ledger.effective_quantity("A"), 300.0));

        env.state.source_material_repo.upsert(&frozen(false)).unwrap();
        let entries = adjustments.consume(&order.adjustment_id, "op").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(approx(
            env.state.batch_api.effective_consumption(id).unwrap()["A"],
            305.0
        ));
    }

    #[test]
    fn test_create_requires_nok() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let adjustments = &env.state.adjustment_api;

        assert!(matches!(
            adjustments.create(
                &batch.batch_id,
                vec![AdjustmentMaterial::new("A", 5.0, "P-ADJ")],
                "qa"
            ),
            Err(ApiError::BusinessRuleViolation(_))
        ));

        env.state
            .batch_api
            .set_nirs(&batch.batch_id, NirsStatus::Nok, "lab")
            .unwrap();
        assert!(matches!(
            adjustments.create(&batch.batch_id, vec![], "qa"),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            adjustments.create(
                &batch.batch_id,
                vec![AdjustmentMaterial::new("A", 0.0, "P-ADJ")],
                "qa"
            ),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            adjustments.get("missing"),
            Err(ApiError::NotFound(_))
        ));
    }
}
