//! Reflex Control - 反应式目标控制核心
//!
//! 机器人运动控制循环的控制目标核心：以固定周期维护一段配置
//! 历史，推进一组可微控制目标（部分带移动 set-point），下发一次
//! 有界非线性优化，产出下一步要命令的关节配置。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **类型层** (`types`): 关节配置、坐标系标识、错误类型
//! - **契约层** (`world` / `feature` / `solver`): 世界模型、可微
//!   特征、优化器的能力接口——消费而不实现
//! - **目标层** (`objective` / `set`): 控制目标、状态机、移动
//!   目标策略、可组合的目标集合代数
//! - **循环层** (`ctrl_loop` / `runner` / `hooks`): 滑动配置窗口、
//!   每拍的 update/solve、状态转移钩子、固定频率运行器
//!
//! # 快速开始
//!
//! ```rust
//! use reflex_control::prelude::*;
//! ```
//!
//! 一个控制节拍是恰好一次 `update` 加一次 `solve`：
//!
//! ```rust,ignore
//! let mut ctrl = ControlLoop::new(world, optimizer, 0.01, 2)?;
//! ctrl.add_q_control_objective(1, 0.1)?;
//!
//! loop {
//!     ctrl.update(&read_joint_state())?;
//!     let next = ctrl.solve()?;
//!     send_to_actuators(&next);
//! }
//! ```
//!
//! 机器人行为用 [`ObjectiveSet`](set::ObjectiveSet) 编写、用 `+`
//! 组合，再整批接入循环；循环只看到扁平的目标列表。

pub mod ctrl_loop;
pub mod feature;
pub mod hooks;
pub mod objective;
pub mod runner;
pub mod set;
pub mod solver;
pub mod types;
pub mod window;
pub mod world;

// Prelude 模块
pub mod prelude;

// --- Facade：常用类型的顶层导出 ---

pub use ctrl_loop::{ControlLoop, DiagnosticsConfig};
pub use feature::{EvalContext, Feature, FeatureEval, JointStateFeature, QControlFeature};
pub use hooks::{ChannelStatusHook, StatusCallback, StatusEvent, StatusHooks};
pub use objective::{
    ActStatus, ControlObjective, CtrlHandle, MovingTarget, ObjectiveKind, ObjectiveSpec, Target,
    target::{ConstVelTarget, CubicProfileTarget, MovingTargetPolicy},
};
pub use runner::{CommandSink, RunConfig, run_loop};
pub use set::{EQ_PRECISION, ObjectiveSet, is_feasible};
pub use solver::{
    ObjectiveView, OptimizationProblem, Optimizer, ResidualBlock, SolveOptions, SolveReport,
};
pub use types::{CtrlError, FrameId, JointConfig};
pub use window::ConfigWindow;
pub use world::{FrameSelector, WorldModel};
