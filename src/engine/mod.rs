//! 执行引擎：按顺序运行已校验的计划
//!
//! 每一步：StepContext 解析占位符 → ToolExecutor 查找并调用工具 → 结果无条件记入 StepContext。
//! 步骤严格串行（后一步可能依赖前一步的结果）；解析失败与工具失败同样交给 decide 处理。
//! 每次执行拥有独立的 StepContext，多个执行可以并发共享同一个 ToolRegistry。

pub mod events;
pub mod report;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::{Resolution, StepContext, StepResult};
use crate::core::{decide, Decision, ExecutionPhase, ExecutionStrategy, StepFailure};
use crate::extract::ResultExtractor;
use crate::plan::{parse_plan_text, Plan, PlanParseError, TaskStep};
use crate::tools::{ToolExecutor, ToolRegistry};

pub use events::ExecutionEvent;
pub use report::{ExecutionReport, PlanOutcome, StepRecord};

use events::send_event;

pub struct ExecutionEngine {
    executor: ToolExecutor,
    extractor: ResultExtractor,
    event_tx: Option<UnboundedSender<ExecutionEvent>>,
}

impl ExecutionEngine {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            extractor: ResultExtractor::default(),
            event_tx: None,
        }
    }

    pub fn with_extractor(mut self, extractor: ResultExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// 可选：向调用方推送阶段切换与步骤进度
    pub fn with_event_tx(mut self, tx: UnboundedSender<ExecutionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.executor.registry()
    }

    pub fn extractor(&self) -> &ResultExtractor {
        &self.extractor
    }

    /// 解析计划文本并执行；计划不合法时在任何步骤运行前返回 PlanParseError
    pub async fn run_plan_text(
        &self,
        text: &str,
        strategy: ExecutionStrategy,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, PlanParseError> {
        let plan = parse_plan_text(text)?;
        Ok(self.execute(&plan, strategy, cancel).await)
    }

    /// 执行计划。除 PlanParseError 外的所有错误都记录在对应步骤的结果中，由策略决定去向
    pub async fn execute(
        &self,
        plan: &Plan,
        strategy: ExecutionStrategy,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("plan", run_id = %run_id, %strategy);
        self.run(plan, strategy, cancel, run_id).instrument(span).await
    }

    async fn run(
        &self,
        plan: &Plan,
        strategy: ExecutionStrategy,
        cancel: &CancellationToken,
        run_id: String,
    ) -> ExecutionReport {
        let started = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut phases = PhaseTracker::new(self.event_tx.clone());
        let mut context = StepContext::new();
        let mut records: Vec<StepRecord> = Vec::with_capacity(plan.len());
        let mut outcome = PlanOutcome::Completed;

        info!(steps = plan.len(), "plan execution started");

        for (index, step) in plan.iter().enumerate() {
            phases.enter(ExecutionPhase::Executing { step: index });
            send_event(
                &self.event_tx,
                ExecutionEvent::StepStarted {
                    index,
                    tool: step.tool_name.clone(),
                    goal: step.goal.clone(),
                },
            );

            let record = self.run_step(index, step, &context, cancel).await;
            context.record(record.result.clone());
            send_event(
                &self.event_tx,
                ExecutionEvent::StepFinished {
                    index,
                    tool: step.tool_name.clone(),
                    success: record.result.success,
                    duration_ms: record.duration_ms,
                },
            );
            let failure = record.result.error.clone();
            records.push(record);

            match (decide(failure.is_some(), strategy), failure) {
                (Decision::Continue, _) | (_, None) => {}
                (Decision::StopAndSynthesize, Some(error)) => {
                    warn!(step = index, error = %error, "step failed, degrading to partial results");
                    phases.enter(ExecutionPhase::Degraded { failed_step: index });
                    outcome = PlanOutcome::Degraded {
                        failed_step: index,
                        error,
                    };
                    break;
                }
                (Decision::Abort, Some(error)) => {
                    error!(step = index, error = %error, "step failed, aborting plan");
                    phases.enter(ExecutionPhase::Aborted { failed_step: index });
                    outcome = PlanOutcome::Aborted {
                        failed_step: index,
                        error,
                    };
                    break;
                }
            }
        }

        let manifest = if matches!(outcome, PlanOutcome::Aborted { .. }) {
            None
        } else {
            // 引擎内的整合即生成结果清单；自然语言合成由调用方在拿到报告后进行
            phases.enter(ExecutionPhase::Synthesizing);
            let manifest = self
                .extractor
                .extract(records.iter().map(StepRecord::pair));
            phases.enter(ExecutionPhase::Completed);
            Some(manifest)
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            executed = records.len(),
            total = plan.len(),
            outcome = ?outcome,
            duration_ms,
            "plan execution finished"
        );

        ExecutionReport {
            run_id,
            strategy,
            outcome,
            phases: phases.into_inner(),
            records,
            manifest,
            highlights: context.highlights().clone(),
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            duration_ms,
        }
    }

    async fn run_step(
        &self,
        index: usize,
        step: &TaskStep,
        context: &StepContext,
        cancel: &CancellationToken,
    ) -> StepRecord {
        let start = Instant::now();
        info!(step = index, tool = %step.tool_name, goal = %step.goal, "step started");

        let (resolved, warnings, result) = match context.resolve(&step.parameters, index) {
            Err(e) => (None, Vec::new(), StepResult::failure(StepFailure::from(e))),
            Ok(Resolution {
                parameters,
                warnings,
            }) => {
                let resolved = step.with_parameters(parameters);
                debug!(step = index, parameters = %serde_json::Value::Object(resolved.parameters.clone()), "resolved parameters");
                let result = match self
                    .executor
                    .execute(&resolved.tool_name, resolved.parameters.clone(), cancel)
                    .await
                {
                    Ok(payload) => StepResult::success(payload),
                    Err(failure) => StepResult::failure(failure),
                };
                (Some(resolved), warnings, result)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result.error {
            Some(err) => error!(step = index, tool = %step.tool_name, error = %err, duration_ms, "step failed"),
            None => info!(step = index, tool = %step.tool_name, duration_ms, "step succeeded"),
        }

        StepRecord {
            index,
            step: step.clone(),
            resolved,
            result,
            warnings,
            duration_ms,
        }
    }
}

/// 记录阶段序列并推送事件；非法迁移在 debug 构建下直接断言失败
struct PhaseTracker {
    phases: Vec<ExecutionPhase>,
    event_tx: Option<UnboundedSender<ExecutionEvent>>,
}

impl PhaseTracker {
    fn new(event_tx: Option<UnboundedSender<ExecutionEvent>>) -> Self {
        let mut tracker = Self {
            phases: Vec::new(),
            event_tx,
        };
        tracker.push(ExecutionPhase::Planning);
        tracker
    }

    fn enter(&mut self, next: ExecutionPhase) {
        if let Some(current) = self.phases.last() {
            debug_assert!(
                current.can_transition_to(&next),
                "illegal phase transition {current:?} -> {next:?}"
            );
        }
        self.push(next);
    }

    fn push(&mut self, phase: ExecutionPhase) {
        debug!(phase = ?phase, "phase");
        send_event(
            &self.event_tx,
            ExecutionEvent::PhaseChanged {
                phase: phase.clone(),
            },
        );
        self.phases.push(phase);
    }

    fn into_inner(self) -> Vec<ExecutionPhase> {
        self.phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureKind;
    use crate::plan::PlanValidator;
    use crate::tools::{EchoTool, FnTool};
    use serde_json::{json, Value};

    fn engine() -> ExecutionEngine {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FnTool::new("maps_geo", "地理编码", |_args| async {
            Ok(json!({"location": "116.4,39.9", "pois": [{"lng": 116.4, "lat": 39.9}]}))
        }));
        registry.register(FnTool::new("broken", "always fails", |_args| async {
            Err("service unavailable".to_string())
        }));
        ExecutionEngine::new(ToolExecutor::new(Arc::new(registry), 5))
    }

    fn plan(value: Value) -> Plan {
        PlanValidator::new().validate(&value).unwrap()
    }

    #[tokio::test]
    async fn test_completed_run_flows_data_between_steps() {
        let report = engine()
            .execute(
                &plan(json!([
                    {"goal": "坐标", "tool_name": "maps_geo", "parameters": {"address": "北京"}},
                    {"goal": "回显", "tool_name": "echo",
                     "parameters": {"lng": "{step_0_result.pois[0].lng}"}}
                ])),
                ExecutionStrategy::FailFast,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(report.outcome, PlanOutcome::Completed);
        assert_eq!(report.records[1].result.payload, json!({"lng": "116.4"}));
        assert_eq!(report.highlights["step_0_location"], "116.4,39.9");
        assert!(report.manifest.is_some());
        assert_eq!(
            report.phases[report.phases.len() - 2..],
            [ExecutionPhase::Synthesizing, ExecutionPhase::Completed]
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_is_a_step_failure() {
        let report = engine()
            .execute(
                &plan(json!([
                    {"goal": "坐标", "tool_name": "maps_geo"},
                    {"goal": "拆分", "tool_name": "echo",
                     "parameters": {"lng": "{step_0_result.location.split(',')[0]}"}},
                    {"goal": "不会执行", "tool_name": "echo"}
                ])),
                ExecutionStrategy::GracefulDegrade,
                &CancellationToken::new(),
            )
            .await;
        let (failed_step, error) = report.failure().unwrap();
        assert_eq!(failed_step, 1);
        assert_eq!(error.kind, FailureKind::UnsupportedExpression);
        assert!(report.records[1].resolved.is_none());
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_fast() {
        let report = engine()
            .execute(
                &plan(json!([{"goal": "x", "tool_name": "no_such_tool"}])),
                ExecutionStrategy::FailFast,
                &CancellationToken::new(),
            )
            .await;
        assert!(report.is_aborted());
        assert!(report.manifest.is_none());
        assert_eq!(report.failure().unwrap().1.kind, FailureKind::ToolNotFound);
        assert_eq!(
            report.phases,
            vec![
                ExecutionPhase::Planning,
                ExecutionPhase::Executing { step: 0 },
                ExecutionPhase::Aborted { failed_step: 0 }
            ]
        );
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = engine().with_event_tx(tx);
        let report = engine
            .execute(
                &plan(json!([{"goal": "x", "tool_name": "broken"}])),
                ExecutionStrategy::GracefulDegrade,
                &CancellationToken::new(),
            )
            .await;
        drop(engine);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(events.contains(&ExecutionEvent::StepFinished {
            index: 0,
            tool: "broken".into(),
            success: false,
            duration_ms: report.records[0].duration_ms,
        }));
        assert_eq!(
            events.last(),
            Some(&ExecutionEvent::PhaseChanged {
                phase: ExecutionPhase::Completed
            })
        );
    }

    #[tokio::test]
    async fn test_run_plan_text_rejects_before_execution() {
        let err = engine()
            .run_plan_text(
                r#"[{"goal": "x"}]"#,
                ExecutionStrategy::GracefulDegrade,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PlanParseError::InvalidStep { index: 0, .. }));
    }
}
