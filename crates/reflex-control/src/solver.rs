//! 优化器接口
//!
//! 控制循环不实现求解算法：每个节拍它把活跃目标打包成一个
//! [`OptimizationProblem`] 快照，连同容差/步长配置交给外部
//! [`Optimizer`]，同步拿回下一步配置和一份 [`SolveReport`]。
//!
//! # 实时契约
//!
//! 求解调用是同步的，以迭代上限（不是墙钟）为界：最坏情况的
//! 节拍延迟 = `max_iterations × 单次迭代成本`，调用方要保证这个
//! 上界小于控制周期 `tau`。`max_step` 限制一次求解能让配置跳多远
//! —— 即使残差很大，单次求解也不会命令超过步长界的跳变，这是
//! 每拍都敢调用求解的安全机制。
//!
//! # 快照语义
//!
//! [`OptimizationProblem`] 在 `solve()` 入口一次性截取活跃目标的
//! 特征、坐标系绑定和当前 set-point，之后求解器反复求残差时不再
//! 触碰目标句柄的锁。

use std::fmt;
use std::sync::Arc;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::feature::{EvalContext, Feature};
use crate::objective::{ControlObjective, ObjectiveKind};
use crate::types::{FrameId, JointConfig};
use crate::window::ConfigWindow;

/// 求解配置
///
/// 纯数据（POD），可序列化；默认值即控制循环每拍下发的配置。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// 残差停止容差
    pub stop_tolerance: f64,
    /// 梯度停止容差
    pub stop_g_tolerance: f64,
    /// 迭代上限（实时界）
    pub max_iterations: u32,
    /// 单次求解的最大配置位移（步长界）
    pub max_step: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            stop_tolerance: 1e-4,
            stop_g_tolerance: 1e-4,
            max_iterations: 20,
            max_step: 0.1,
        }
    }
}

/// 求解报告
///
/// 最近一次优化的诊断快照。`sos` 是标量平方和残差——控制循环
/// 用它判定退化求解。求解器不收敛不是错误：体现在 `converged`
/// 和残差字段里，由调用方决定如何处置。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    /// 平方和残差（sos/eq 项）
    pub sos: f64,
    /// 等式约束残差（无穷范数）
    pub eq: f64,
    /// 不等式约束违反量（最大正分量）
    pub ineq: f64,
    /// 实际迭代次数
    pub iterations: u32,
    /// 是否在容差内停止
    pub converged: bool,
}

impl fmt::Display for SolveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sos={:.6}  eq={:.6}  ineq={:.6}  iters={}  converged={}",
            self.sos, self.eq, self.ineq, self.iterations, self.converged
        )
    }
}

/// 活跃目标的求解视图
///
/// 特征 + 约束类型 + 坐标系绑定 + 当前 set-point 的不可变快照。
pub struct ObjectiveView {
    name: String,
    kind: ObjectiveKind,
    feature: Arc<dyn Feature>,
    frames: SmallVec<[FrameId; 4]>,
    target: Option<JointConfig>,
}

impl ObjectiveView {
    pub(crate) fn of(obj: &ControlObjective) -> Self {
        ObjectiveView {
            name: obj.name().unwrap_or("(unnamed)").to_string(),
            kind: obj.kind(),
            feature: Arc::clone(obj.feature()),
            frames: obj.frames().iter().copied().collect(),
            target: obj.target().current().cloned(),
        }
    }

    /// 目标名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 约束类型
    pub fn kind(&self) -> ObjectiveKind {
        self.kind
    }
}

/// 一个目标在试探配置处的残差块
pub struct ResidualBlock {
    /// 约束类型
    pub kind: ObjectiveKind,
    /// 残差向量（特征值减 set-point）
    pub r: JointConfig,
    /// 对当前配置的雅可比
    pub jacobian: DMatrix<f64>,
}

/// 优化问题快照
///
/// 求解器通过 [`eval_at`](Self::eval_at) 在任意试探配置处取残差，
/// 历史槽位保持窗口当前内容（微分阶目标由此获得正确的差分）。
pub struct OptimizationProblem<'a> {
    window: &'a ConfigWindow,
    views: Vec<ObjectiveView>,
}

impl<'a> OptimizationProblem<'a> {
    pub(crate) fn new(window: &'a ConfigWindow, views: Vec<ObjectiveView>) -> Self {
        OptimizationProblem { window, views }
    }

    /// 配置窗口
    pub fn window(&self) -> &ConfigWindow {
        self.window
    }

    /// 目标视图
    pub fn objectives(&self) -> &[ObjectiveView] {
        &self.views
    }

    /// 目标数
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// 在试探配置处求全部残差块
    pub fn eval_at(&self, q: &JointConfig) -> Vec<ResidualBlock> {
        let trial = self.window.with_current(q);
        self.views
            .iter()
            .map(|v| {
                let eval = v.feature.eval(&EvalContext::new(&trial, &v.frames));
                let r = match &v.target {
                    Some(t) => eval.y - t,
                    None => eval.y,
                };
                ResidualBlock {
                    kind: v.kind,
                    r,
                    jacobian: eval.jacobian,
                }
            })
            .collect()
    }

    /// 在试探配置处求标量平方和残差
    ///
    /// sos/eq 块贡献 `‖r‖²`，ineq 块只计正分量（铰链）。
    pub fn sos_at(&self, q: &JointConfig) -> f64 {
        self.eval_at(q)
            .iter()
            .map(|b| match b.kind {
                ObjectiveKind::Sos | ObjectiveKind::Eq => b.r.norm_squared(),
                ObjectiveKind::Ineq => b.r.iter().map(|v| v.max(0.0).powi(2)).sum(),
            })
            .sum()
    }
}

/// 优化器能力接口
///
/// 外部求解层实现此 trait。调用是同步的；实现必须尊重
/// [`SolveOptions`] 的迭代上限和步长界（见模块文档的实时契约），
/// 并且返回恰好一个下一步配置（不是轨迹）。
pub trait Optimizer: Send {
    /// 求解一步
    fn minimize(
        &mut self,
        problem: &OptimizationProblem<'_>,
        options: &SolveOptions,
    ) -> (JointConfig, SolveReport);
}
