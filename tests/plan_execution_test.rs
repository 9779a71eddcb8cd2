//! 计划执行集成测试

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use stepwise::context::ResolveWarning;
    use stepwise::core::{ExecutionPhase, ExecutionStrategy, FailureKind};
    use stepwise::engine::{ExecutionEngine, PlanOutcome};
    use stepwise::extract::FileKind;
    use stepwise::plan::PlanParseError;
    use stepwise::tools::{FnTool, Tool, ToolArgs, ToolExecutor, ToolRegistry};

    /// 记录调用次数的工具
    struct CountingTool {
        name: &'static str,
        output: Result<Value, String>,
        count: AtomicUsize,
    }

    impl CountingTool {
        fn new(name: &'static str, output: Result<Value, String>) -> Arc<Self> {
            Arc::new(Self {
                name,
                output,
                count: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "counting test double"
        }

        async fn execute(&self, _args: ToolArgs) -> Result<Value, String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.output.clone()
        }
    }

    struct Fixture {
        engine: ExecutionEngine,
        file: Arc<CountingTool>,
        broken: Arc<CountingTool>,
        weather: Arc<CountingTool>,
    }

    fn fixture() -> Fixture {
        let file = CountingTool::new("file_tool", Ok(json!("/output/trip.html")));
        let broken = CountingTool::new("maps_geo", Err("geocoder unavailable".to_string()));
        let weather = CountingTool::new(
            "maps_weather",
            Ok(json!({"forecasts": [{"date": "2024-05-01", "dayweather": "晴"}]})),
        );
        let mut registry = ToolRegistry::new();
        registry.register_arc(file.clone());
        registry.register_arc(broken.clone());
        registry.register_arc(weather.clone());
        registry.register(FnTool::new("maps_text_search", "POI 搜索", |_args| async {
            Ok(json!({"pois": [{"name": "故宫", "lng": 116.4, "lat": 39.9}]}))
        }));
        registry.register(FnTool::new("echo", "回显", |args: ToolArgs| async move {
            Ok(Value::Object(args))
        }));
        registry.register(FnTool::new("slow_search", "很慢的搜索", |_args| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(json!("late"))
        }));
        Fixture {
            engine: ExecutionEngine::new(ToolExecutor::new(Arc::new(registry), 5)),
            file,
            broken,
            weather,
        }
    }

    const THREE_STEP_PLAN: &str = r#"[
        {"goal": "生成行程文件", "tool_name": "file_tool", "parameters": {"title": "北京"}},
        {"goal": "获取坐标", "tool_name": "maps_geo", "parameters": {"address": "{step_0_result}"}},
        {"goal": "查天气", "tool_name": "maps_weather", "parameters": {"city": "{step_1_result.city}"}}
    ]"#;

    #[tokio::test]
    async fn test_missing_tool_name_rejects_plan_before_any_invocation() {
        let f = fixture();
        let text = r#"[
            {"goal": "生成文件", "tool_name": "file_tool", "parameters": {}},
            {"goal": "没有工具名", "parameters": {"address": "北京"}}
        ]"#;
        let err = f
            .engine
            .run_plan_text(text, ExecutionStrategy::GracefulDegrade, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlanParseError::InvalidStep { index: 1, .. }));
        assert_eq!(f.file.calls() + f.broken.calls() + f.weather.calls(), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_failing_step() {
        let f = fixture();
        let report = f
            .engine
            .run_plan_text(THREE_STEP_PLAN, ExecutionStrategy::FailFast, &CancellationToken::new())
            .await
            .unwrap();

        let (failed_step, error) = report.failure().unwrap();
        assert_eq!(failed_step, 1);
        assert_eq!(error.kind, FailureKind::ToolExecution);
        assert!(error.message.contains("geocoder unavailable"));
        assert!(report.is_aborted());
        assert!(report.manifest.is_none());
        assert_eq!(f.weather.calls(), 0);
        assert_eq!(report.executed_indices(), vec![0, 1]);
        assert_eq!(
            report.final_phase(),
            Some(&ExecutionPhase::Aborted { failed_step: 1 })
        );
    }

    #[tokio::test]
    async fn test_graceful_degrade_keeps_earlier_artifacts() {
        let f = fixture();
        let report = f
            .engine
            .run_plan_text(
                THREE_STEP_PLAN,
                ExecutionStrategy::GracefulDegrade,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            report.outcome,
            PlanOutcome::Degraded { failed_step: 1, .. }
        ));
        assert_eq!(f.weather.calls(), 0);
        let manifest = report.manifest.as_ref().unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, "/output/trip.html");
        assert_eq!(manifest.files[0].kind, FileKind::Html);
        assert_eq!(
            report.phases,
            vec![
                ExecutionPhase::Planning,
                ExecutionPhase::Executing { step: 0 },
                ExecutionPhase::Executing { step: 1 },
                ExecutionPhase::Degraded { failed_step: 1 },
                ExecutionPhase::Synthesizing,
                ExecutionPhase::Completed,
            ]
        );
        // 失败的步骤也被记录，后续引用解析到其错误 payload
        assert!(report.records[1].result.payload["error"]
            .as_str()
            .unwrap()
            .contains("geocoder unavailable"));
    }

    #[tokio::test]
    async fn test_poi_lookup_and_out_of_range_warning() {
        let f = fixture();
        let text = r#"[
            {"goal": "搜索景点", "tool_name": "maps_text_search", "parameters": {"keywords": "故宫"}},
            {"goal": "取坐标", "tool_name": "echo", "parameters": {
                "lng": "{step_0_result.pois[0].lng}",
                "missing": "{step_0_result.pois[5].lng}"
            }}
        ]"#;
        let report = f
            .engine
            .run_plan_text(text, ExecutionStrategy::FailFast, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.outcome, PlanOutcome::Completed);
        assert_eq!(
            report.records[1].result.payload,
            json!({"lng": "116.4", "missing": ""})
        );
        assert_eq!(report.records[1].warnings.len(), 1);
        assert!(matches!(
            &report.records[1].warnings[0],
            ResolveWarning::UnresolvedPath { expression, .. } if expression == "{step_0_result.pois[5].lng}"
        ));
        assert_eq!(report.manifest.unwrap().pois.len(), 1);
    }

    #[tokio::test]
    async fn test_forward_reference_is_step_failure() {
        let f = fixture();
        let text = r#"[
            {"goal": "引用未来", "tool_name": "echo", "parameters": {"x": "{step_1_result.city}"}},
            {"goal": "查天气", "tool_name": "maps_weather", "parameters": {}}
        ]"#;
        let report = f
            .engine
            .run_plan_text(text, ExecutionStrategy::GracefulDegrade, &CancellationToken::new())
            .await
            .unwrap();
        let (failed_step, error) = report.failure().unwrap();
        assert_eq!(failed_step, 0);
        assert_eq!(error.kind, FailureKind::ForwardReference);
        assert_eq!(f.weather.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_expression_is_step_failure() {
        let f = fixture();
        let text = r#"[
            {"goal": "搜索", "tool_name": "maps_text_search", "parameters": {}},
            {"goal": "换算", "tool_name": "echo", "parameters": {"km": "{step_0_result.pois[0].lng * 2}"}}
        ]"#;
        let report = f
            .engine
            .run_plan_text(text, ExecutionStrategy::FailFast, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            report.failure().unwrap().1.kind,
            FailureKind::UnsupportedExpression
        );
    }

    #[tokio::test]
    async fn test_cancellation_is_a_step_failure() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let text = r#"[
            {"goal": "生成文件", "tool_name": "file_tool", "parameters": {}},
            {"goal": "慢搜索", "tool_name": "slow_search", "parameters": {}},
            {"goal": "查天气", "tool_name": "maps_weather", "parameters": {}}
        ]"#;
        let report = f
            .engine
            .run_plan_text(text, ExecutionStrategy::GracefulDegrade, &cancel)
            .await
            .unwrap();
        let (failed_step, error) = report.failure().unwrap();
        assert_eq!(failed_step, 1);
        assert_eq!(error.kind, FailureKind::Cancelled);
        assert_eq!(report.manifest.unwrap().files.len(), 1);
        assert_eq!(f.weather.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_a_step_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::new("slow_search", "很慢的搜索", |_args| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(json!("late"))
        }));
        let executor = ToolExecutor::new(Arc::new(registry), 0)
            .with_timeout(Some(Duration::from_millis(20)));
        let engine = ExecutionEngine::new(executor);
        let report = engine
            .run_plan_text(
                r#"[{"goal": "慢搜索", "tool_name": "slow_search"}]"#,
                ExecutionStrategy::FailFast,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.failure().unwrap().1.kind, FailureKind::ToolTimeout);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_isolated() {
        let f = fixture();
        let a = r#"[
            {"goal": "搜索", "tool_name": "maps_text_search", "parameters": {}},
            {"goal": "回显", "tool_name": "echo", "parameters": {"v": "{step_0_result.pois[0].name}"}}
        ]"#;
        let b = r#"[
            {"goal": "文件", "tool_name": "file_tool", "parameters": {}},
            {"goal": "回显", "tool_name": "echo", "parameters": {"v": "{step_0_result}"}}
        ]"#;
        let cancel = CancellationToken::new();
        let (ra, rb) = tokio::join!(
            f.engine
                .run_plan_text(a, ExecutionStrategy::FailFast, &cancel),
            f.engine
                .run_plan_text(b, ExecutionStrategy::FailFast, &cancel)
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert_eq!(ra.records[1].result.payload, json!({"v": "故宫"}));
        assert_eq!(rb.records[1].result.payload, json!({"v": "/output/trip.html"}));
        assert_ne!(ra.run_id, rb.run_id);
    }

    #[tokio::test]
    async fn test_repeated_runs_resolve_identically() {
        let f = fixture();
        let text = r#"[
            {"goal": "搜索", "tool_name": "maps_text_search", "parameters": {}},
            {"goal": "回显", "tool_name": "echo", "parameters": {
                "label": "{step_0_result.pois[0].name}@{step_0_result.pois[0].lng},{step_0_result.pois[0].lat}"
            }}
        ]"#;
        let cancel = CancellationToken::new();
        let first = f
            .engine
            .run_plan_text(text, ExecutionStrategy::FailFast, &cancel)
            .await
            .unwrap();
        let second = f
            .engine
            .run_plan_text(text, ExecutionStrategy::FailFast, &cancel)
            .await
            .unwrap();
        let render = |r: &stepwise::ExecutionReport| {
            serde_json::to_string(&r.records[1].resolved).unwrap()
        };
        assert_eq!(render(&first), render(&second));
        assert_eq!(first.records[1].result.payload["label"], "故宫@116.4,39.9");
    }
}
