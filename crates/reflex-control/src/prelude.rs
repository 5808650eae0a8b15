//! Prelude - 常用类型的便捷导入
//!
//! 大多数用户应该使用这个模块来导入常用类型：
//!
//! ```rust
//! use reflex_control::prelude::*;
//! ```

pub use crate::ctrl_loop::{ControlLoop, DiagnosticsConfig};
pub use crate::feature::{EvalContext, Feature, FeatureEval, JointStateFeature, QControlFeature};
pub use crate::hooks::{ChannelStatusHook, StatusCallback, StatusEvent};
pub use crate::objective::target::{ConstVelTarget, CubicProfileTarget, MovingTargetPolicy};
pub use crate::objective::{
    ActStatus, ControlObjective, CtrlHandle, ObjectiveKind, ObjectiveSpec, Target,
};
pub use crate::runner::{CommandSink, RunConfig, run_loop};
pub use crate::set::{EQ_PRECISION, ObjectiveSet, is_feasible};
pub use crate::solver::{OptimizationProblem, Optimizer, SolveOptions, SolveReport};
pub use crate::types::{CtrlError, FrameId, JointConfig};
pub use crate::window::ConfigWindow;
pub use crate::world::{FrameSelector, WorldModel};
