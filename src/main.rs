//! Stepwise 命令行：对一个计划文件执行一次
//!
//! 入口：加载配置、初始化日志、构建注册表（内置 echo），校验并执行计划，把执行报告以 JSON 打印到 stdout。
//! 计划不合法或执行被中止时以非零状态退出。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use stepwise::config::load_config;
use stepwise::core::ExecutionStrategy;
use stepwise::engine::ExecutionEngine;
use stepwise::extract::ResultExtractor;
use stepwise::observability;
use stepwise::plan::parse_plan_text;
use stepwise::tools::{EchoTool, ToolExecutor, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "stepwise")]
#[command(about = "Validate and execute a multi-step tool plan", long_about = None)]
struct Args {
    /// 计划文件（JSON 步骤数组，可带代码块与注释）
    #[arg(value_name = "PLAN")]
    plan: PathBuf,

    /// 失败策略：fail_fast | graceful_degrade（默认取配置）
    #[arg(long)]
    strategy: Option<ExecutionStrategy>,

    /// 额外的配置文件
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    observability::init();

    let config = load_config(args.config.clone()).context("Failed to load config")?;
    let strategy = args.strategy.unwrap_or(config.executor.strategy);

    let text = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("Failed to read plan file {}", args.plan.display()))?;
    let plan = match parse_plan_text(&text) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!(error = %e, "plan rejected");
            eprintln!("plan rejected: {e}");
            return Ok(ExitCode::from(2));
        }
    };

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let executor = ToolExecutor::new(Arc::new(registry), config.executor.tool_timeout_secs);
    let engine = ExecutionEngine::new(executor)
        .with_extractor(ResultExtractor::new(config.manifest.clone()));

    // Ctrl-C 取消正在执行的工具调用，按步骤失败处理
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let report = engine.execute(&plan, strategy, &cancel).await;
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{json}");

    Ok(if report.is_aborted() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
