//! 错误类型定义
//!
//! 控制核心的错误分为两类：
//!
//! - **构造期错误**（fail-fast）：未知坐标系、窗口太短、非法周期等。
//!   这些是编程错误，在目标被加入控制循环时立即报错，绝不推迟到
//!   `solve()` —— 输出直接驱动执行器，静默产生退化配置是不可接受的。
//! - **运行期软条件**：求解残差过大等可恢复情况不走错误通道，
//!   而是通过诊断日志和 [`SolveReport`](crate::solver::SolveReport) 暴露。

use thiserror::Error;

/// 控制核心错误类型
#[derive(Debug, Error)]
pub enum CtrlError {
    /// 世界模型中不存在的坐标系名
    #[error("Unknown frame name: {name:?}")]
    UnknownFrame {
        /// 未解析的名字
        name: String,
    },

    /// 配置窗口不足以支撑微分阶目标
    ///
    /// 速度阶目标需要 `k_order >= 1`，加速度阶目标需要 `k_order >= 2`。
    #[error("Config window too short: feature order {required} needs k_order >= {required}, loop has {available}")]
    WindowTooShort {
        /// 特征所需的微分阶
        required: usize,
        /// 循环实际的 k_order
        available: usize,
    },

    /// 非法的控制周期
    #[error("Invalid cycle period tau: {tau} (must be > 0)")]
    InvalidPeriod {
        /// 传入的周期（秒）
        tau: f64,
    },

    /// 非法的微分阶
    ///
    /// 关节空间正则化目标只支持阶 1（速度阻尼）和阶 2（加速度阻尼）。
    #[error("Invalid q-control order: {order} (must be 1 or 2)")]
    InvalidOrder {
        /// 传入的阶
        order: usize,
    },

    /// 维度不匹配
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// 期望维度
        expected: usize,
        /// 实际维度
        actual: usize,
    },

    /// 命令下发失败（仅由循环运行器使用）
    #[error("Command sink failed: {0}")]
    CommandFailed(String),
}
