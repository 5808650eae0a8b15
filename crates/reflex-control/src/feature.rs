//! 可微特征接口
//!
//! 特征（feature）是配置空间上的可微函数：给定配置窗口，产出一个
//! 值向量和对当前配置的雅可比矩阵。运动学特征（末端位姿、距离等）
//! 由外部运动学层实现；本模块只定义接口，并内置两个关节空间特征
//! （求解器的正则化项用）。
//!
//! # 设计理念
//!
//! - **能力接口**: 具体特征是 trait 实现，不是类层次
//! - **上下文求值**: 特征从 [`EvalContext`] 读窗口和坐标系绑定，
//!   自身保持无状态，可安全地被多个目标共享（`Arc`）
//! - **微分阶显式**: `order()` 声明特征需要多少历史配置，
//!   在目标接入循环时校验，不在求值时才发现
//!
//! # 示例
//!
//! ```rust
//! use reflex_control::feature::{EvalContext, Feature, JointStateFeature};
//! use reflex_control::types::JointConfig;
//! use reflex_control::window::ConfigWindow;
//!
//! let feat = JointStateFeature::new(2);
//! let win = ConfigWindow::new(0, 0.01, JointConfig::from_vec(vec![0.3, -0.1])).unwrap();
//! let eval = feat.eval(&EvalContext::new(&win, &[]));
//! assert_eq!(eval.y[0], 0.3);
//! ```

use nalgebra::DMatrix;

use crate::types::{CtrlError, FrameId, JointConfig};
use crate::window::ConfigWindow;
use crate::world::WorldModel;

/// 特征求值结果
///
/// 值向量和对当前配置（窗口偏移 0）的雅可比矩阵。
#[derive(Debug, Clone)]
pub struct FeatureEval {
    /// 值向量
    pub y: JointConfig,
    /// 雅可比矩阵（行 = 特征维度，列 = 关节空间维度）
    pub jacobian: DMatrix<f64>,
}

/// 特征求值上下文
///
/// 窗口提供配置历史和周期 `tau`；坐标系绑定来自目标
/// （构造时解析，见 [`FrameSelector`](crate::world::FrameSelector)），
/// 关节空间特征可以忽略它。
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// 配置窗口
    pub window: &'a ConfigWindow,
    /// 目标绑定的坐标系
    pub frames: &'a [FrameId],
}

impl<'a> EvalContext<'a> {
    /// 创建求值上下文
    pub fn new(window: &'a ConfigWindow, frames: &'a [FrameId]) -> Self {
        EvalContext { window, frames }
    }
}

/// 可微特征接口
///
/// 外部运动学层实现此 trait 提供末端位姿、碰撞距离等特征；
/// 控制核心自带关节空间特征。实现必须无状态（求值不写任何
/// 内部缓存），以便被 `Arc` 共享。
pub trait Feature: Send + Sync {
    /// 在给定上下文求值
    fn eval(&self, ctx: &EvalContext<'_>) -> FeatureEval;

    /// 特征维度
    fn dim(&self) -> usize;

    /// 微分阶
    ///
    /// 求值最多往回看多少个历史配置。阶 0 只读当前配置，
    /// 阶 1 需要一个历史槽位，依此类推。默认阶 0。
    fn order(&self) -> usize {
        0
    }

    /// 人类可读的短标签
    ///
    /// 控制循环在第一次 `update` 时用它给未命名的目标起名。
    fn short_tag(&self, world: &dyn WorldModel) -> String;
}

/// 关节状态特征（阶 0）
///
/// 恒等映射乘以标量：`y = scale * q`，雅可比是缩放的单位阵。
/// 配合固定目标即构成关节空间的位置保持/回归目标。
#[derive(Debug, Clone)]
pub struct JointStateFeature {
    dim: usize,
    scale: f64,
}

impl JointStateFeature {
    /// 创建关节状态特征（scale = 1）
    pub fn new(dim: usize) -> Self {
        JointStateFeature { dim, scale: 1.0 }
    }

    /// 设置标量缩放
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

impl Feature for JointStateFeature {
    fn eval(&self, ctx: &EvalContext<'_>) -> FeatureEval {
        let q = ctx.window.current();
        FeatureEval {
            y: q * self.scale,
            jacobian: DMatrix::identity(self.dim, self.dim) * self.scale,
        }
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn short_tag(&self, _world: &dyn WorldModel) -> String {
        "qItself".to_string()
    }
}

/// 关节空间微分特征（阶 1 或 2）
///
/// 有限差分近似关节速度/加速度：
///
/// ```text
/// 阶 1:  y = scale * (q[0] - q[-1]) / tau
/// 阶 2:  y = scale * (q[0] - 2*q[-1] + q[-2]) / tau²
/// ```
///
/// 以 sum-of-squares 目标接入即为速度/加速度阻尼正则化。
#[derive(Debug, Clone)]
pub struct QControlFeature {
    order: usize,
    scale: f64,
    dim: usize,
}

impl QControlFeature {
    /// 创建微分特征
    ///
    /// # 错误
    ///
    /// `order` 不在 {1, 2} 内返回 [`CtrlError::InvalidOrder`]。
    pub fn new(order: usize, scale: f64, dim: usize) -> Result<Self, CtrlError> {
        if order != 1 && order != 2 {
            return Err(CtrlError::InvalidOrder { order });
        }
        Ok(QControlFeature { order, scale, dim })
    }
}

impl Feature for QControlFeature {
    fn eval(&self, ctx: &EvalContext<'_>) -> FeatureEval {
        let win = ctx.window;
        debug_assert!(
            win.k_order() >= self.order,
            "q-control feature of order {} evaluated on window with k_order {}",
            self.order,
            win.k_order()
        );
        let tau = win.tau();
        let (y, factor) = match self.order {
            1 => {
                let factor = self.scale / tau;
                ((win.offset(0) - win.offset(-1)) * factor, factor)
            }
            _ => {
                let factor = self.scale / (tau * tau);
                (
                    (win.offset(0) - win.offset(-1) * 2.0 + win.offset(-2)) * factor,
                    factor,
                )
            }
        };
        FeatureEval {
            y,
            jacobian: DMatrix::identity(self.dim, self.dim) * factor,
        }
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn order(&self) -> usize {
        self.order
    }

    fn short_tag(&self, _world: &dyn WorldModel) -> String {
        match self.order {
            1 => "qVel".to_string(),
            _ => "qAcc".to_string(),
        }
    }
}
