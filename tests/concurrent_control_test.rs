// ==========================================
// 并发控制集成测试
// ==========================================
// 职责: 同一批次多线程写入时台账不丢失、不重复
// ==========================================


#[cfg(test)]
mod concurrent_control_test {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use batch_execution::api::{ApiError, BatchApi};

    use crate::test_helpers::{approx, setup_env, start_first_batch};

    /// 遇到处理中标记时重试
    fn record_with_retry(api: &BatchApi, batch_id: &str, ingredient: &str, source: &str, qty: f64) {
        loop {
            match api.record_consumption(batch_id, ingredient, source, qty, "op") {
                Ok(_) => return,
                Err(ApiError::IngredientBusy { .. }) => thread::sleep(Duration::from_millis(1)),
                Err(e) => panic!("投料失败: {:?}", e),
            }
        }
    }

    #[test]
    fn test_concurrent_entries_on_same_ingredient() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api: Arc<BatchApi> = env.state.batch_api.clone();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let api = api.clone();
                let batch_id = batch.batch_id.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        record_with_retry(&api, &batch_id, "A", "P-A", 10.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = api.get_batch(&batch.batch_id).unwrap();
        assert_eq!(stored.ledger.len(), 20);
        assert!(approx(stored.ledger.effective_quantity("A"), 200.0));
        assert_eq!(api.action_history(&batch.batch_id).unwrap().len(), 21);
    }

    #[test]
    fn test_concurrent_entries_on_different_ingredients() {
        let env = setup_env();
        let (_run, batch) = start_first_batch(&env, 500.0, 500.0);
        let api: Arc<BatchApi> = env.state.batch_api.clone();

        let handles: Vec<_> = [("A", "P-A"), ("B", "P-B")]
            .into_iter()
            .map(|(ingredient, source)| {
                let api = api.clone();
                let batch_id = batch.batch_id.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        record_with_retry(&api, &batch_id, ingredient, source, 20.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let effective = api.effective_consumption(&batch.batch_id).unwrap();
        assert!(approx(effective["A"], 200.0));
        assert!(approx(effective["B"], 200.0));
        assert_eq!(api.get_batch(&batch.batch_id).unwrap().ledger.len(), 20);
    }
}
