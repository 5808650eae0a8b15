//! 目标集合代数
//!
//! [`ObjectiveSet`] 是一组共享目标句柄的有序捆绑：一个机器人行为
//! （"抓取"、"回零位"）写成一个集合，复杂行为用 `+` 拼接。集合
//! 本身不持有任何求值状态——可行性/收敛查询是纯函数，对调用方
//! 给定的配置窗口快照求值。
//!
//! # 组合
//!
//! `A + B` 产出一个新集合，序列是 A 的目标后接 B 的目标（共享
//! 引用，不复制，不去重）。插入顺序对组合有意义，对求值没有。
//!
//! # 作为前置条件门
//!
//! [`can_be_initiated`](ObjectiveSet::can_be_initiated) 是把集合
//! 激活为控制程序一部分之前的门：全部等式/不等式约束都已在精度
//! 内才放行。空集平凡可行。
//!
//! # 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use reflex_control::feature::JointStateFeature;
//! use reflex_control::objective::ObjectiveKind;
//! use reflex_control::set::ObjectiveSet;
//!
//! let mut reach = ObjectiveSet::new("reach");
//! reach.add_objective(Arc::new(JointStateFeature::new(6)), ObjectiveKind::Sos);
//!
//! let mut hold = ObjectiveSet::new("hold");
//! hold.add_objective(Arc::new(JointStateFeature::new(6)), ObjectiveKind::Eq);
//!
//! let combined = &reach + &hold;
//! assert_eq!(combined.len(), 2);
//! ```

use std::fmt;
use std::ops::Add;
use std::sync::Arc;

use crate::feature::{Feature, QControlFeature};
use crate::objective::{ControlObjective, CtrlHandle, ObjectiveKind};
use crate::types::CtrlError;
use crate::window::ConfigWindow;

/// 等式/收敛判定的默认精度
pub const EQ_PRECISION: f64 = 1e-4;

/// 有序的目标捆绑
///
/// 见模块文档。句柄是共享的：同一目标可以同时出现在多个集合和
/// 一个控制循环里，最后一个引用释放时才销毁。
#[derive(Default, Clone)]
pub struct ObjectiveSet {
    name: String,
    objectives: Vec<CtrlHandle>,
}

impl ObjectiveSet {
    /// 创建空集合
    pub fn new(name: impl Into<String>) -> Self {
        ObjectiveSet {
            name: name.into(),
            objectives: Vec::new(),
        }
    }

    /// 集合名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 构造并追加一个目标，返回共享句柄
    pub fn add_objective(&mut self, feature: Arc<dyn Feature>, kind: ObjectiveKind) -> CtrlHandle {
        let handle = ControlObjective::new(feature, kind).into_handle();
        self.objectives.push(Arc::clone(&handle));
        handle
    }

    /// 构造并追加一个瞬态目标：`ticks` 拍后自动停用
    pub fn add_transient_objective(
        &mut self,
        feature: Arc<dyn Feature>,
        kind: ObjectiveKind,
        ticks: u32,
    ) -> CtrlHandle {
        let handle = self.add_objective(feature, kind);
        handle.write().set_transient_ticks(Some(ticks));
        handle
    }

    /// 构造并追加一个关节空间正则化目标
    ///
    /// 阶 1 = 速度阻尼，阶 2 = 加速度阻尼，按 `scale` 缩放，
    /// 维度取关节空间大小 `dim`。约束类型是 sum-of-squares。
    ///
    /// # 错误
    ///
    /// `order` 不在 {1, 2} 内返回 [`CtrlError::InvalidOrder`]。
    pub fn add_q_control_objective(
        &mut self,
        order: usize,
        scale: f64,
        dim: usize,
    ) -> Result<CtrlHandle, CtrlError> {
        let feat = QControlFeature::new(order, scale, dim)?;
        Ok(self.add_objective(Arc::new(feat), ObjectiveKind::Sos))
    }

    /// 追加一个已存在的共享句柄
    pub fn push_handle(&mut self, handle: CtrlHandle) {
        self.objectives.push(handle);
    }

    /// 目标序列
    pub fn objectives(&self) -> &[CtrlHandle] {
        &self.objectives
    }

    /// 目标数
    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    /// 激活前置条件：全部等式/不等式约束在默认精度内
    ///
    /// 空集平凡为真。纯查询，不触碰任何目标状态。
    pub fn can_be_initiated(&self, window: &ConfigWindow) -> bool {
        self.can_be_initiated_with(window, EQ_PRECISION)
    }

    /// 同 [`can_be_initiated`](Self::can_be_initiated)，显式精度
    pub fn can_be_initiated_with(&self, window: &ConfigWindow, precision: f64) -> bool {
        self.objectives.iter().all(|h| {
            let o = h.read();
            match o.kind() {
                ObjectiveKind::Eq | ObjectiveKind::Ineq => o.within_precision(window, precision),
                ObjectiveKind::Sos => true,
            }
        })
    }

    /// 收敛判定：全部等式/平方和目标的残差在默认精度内
    pub fn is_converged(&self, window: &ConfigWindow) -> bool {
        self.is_converged_with(window, EQ_PRECISION)
    }

    /// 同 [`is_converged`](Self::is_converged)，显式精度
    pub fn is_converged_with(&self, window: &ConfigWindow, precision: f64) -> bool {
        self.objectives.iter().all(|h| {
            let o = h.read();
            match o.kind() {
                ObjectiveKind::Eq | ObjectiveKind::Sos => o.within_precision(window, precision),
                ObjectiveKind::Ineq => true,
            }
        })
    }

    /// 输出集合内每个目标的状态（诊断用）
    pub fn report(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(w, "objective set '{}' ({} objectives):", self.name, self.len())?;
        for h in &self.objectives {
            h.read().report_state(w)?;
        }
        Ok(())
    }
}

/// 可行性判定（自由函数）
///
/// - `init_only = true`: 等价于 [`ObjectiveSet::can_be_initiated`]
/// - `init_only = false`: 要求可激活 **且** 已收敛
pub fn is_feasible(
    set: &ObjectiveSet,
    window: &ConfigWindow,
    init_only: bool,
    eq_precision: f64,
) -> bool {
    let initiable = set.can_be_initiated_with(window, eq_precision);
    if init_only {
        initiable
    } else {
        initiable && set.is_converged_with(window, eq_precision)
    }
}

impl Add<&ObjectiveSet> for &ObjectiveSet {
    type Output = ObjectiveSet;

    /// 拼接组合：A 的目标后接 B 的目标（共享引用，不去重）
    fn add(self, rhs: &ObjectiveSet) -> ObjectiveSet {
        let mut objectives = Vec::with_capacity(self.len() + rhs.len());
        objectives.extend(self.objectives.iter().cloned());
        objectives.extend(rhs.objectives.iter().cloned());
        ObjectiveSet {
            name: format!("{}+{}", self.name, rhs.name),
            objectives,
        }
    }
}

impl Add for ObjectiveSet {
    type Output = ObjectiveSet;

    fn add(self, rhs: ObjectiveSet) -> ObjectiveSet {
        &self + &rhs
    }
}
