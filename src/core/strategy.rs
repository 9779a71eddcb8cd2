//! 失败处理策略
//!
//! 每次计划执行开始时选定一次，执行期间不可更改；decide 把「本步是否失败」映射为下一步动作，
//! 让引擎的主循环保持单一形态。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 步骤失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// 首个失败步骤即中止，不再整合结果
    FailFast,
    /// 失败后停止后续步骤，但用已成功的步骤继续整合
    #[default]
    GracefulDegrade,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::FailFast => f.write_str("fail_fast"),
            ExecutionStrategy::GracefulDegrade => f.write_str("graceful_degrade"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "failfast" => Ok(ExecutionStrategy::FailFast),
            "graceful_degrade" | "gracefuldegrade" | "degrade" => {
                Ok(ExecutionStrategy::GracefulDegrade)
            }
            other => Err(format!(
                "unknown execution strategy '{other}' (expected fail_fast or graceful_degrade)"
            )),
        }
    }
}

/// 一个步骤结束后引擎应采取的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 执行下一步
    Continue,
    /// 停止执行，用已有结果进入整合
    StopAndSynthesize,
    /// 中止整个计划并上报失败步骤
    Abort,
}

pub fn decide(step_failed: bool, strategy: ExecutionStrategy) -> Decision {
    if !step_failed {
        return Decision::Continue;
    }
    match strategy {
        ExecutionStrategy::FailFast => Decision::Abort,
        ExecutionStrategy::GracefulDegrade => Decision::StopAndSynthesize,
    }
}
