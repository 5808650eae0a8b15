//! 目标构造说明
//!
//! [`ObjectiveSpec`] 是控制循环工厂方法的输入：特征、约束类型，
//! 加上可选的坐标系选择、目标值、瞬态过期和显示名。坐标系解析
//! 和维度校验在 [`ControlLoop::add_objective`](crate::ctrl_loop::ControlLoop::add_objective)
//! 消费 spec 时 fail-fast 完成。
//!
//! # 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use reflex_control::feature::JointStateFeature;
//! use reflex_control::objective::{ObjectiveKind, ObjectiveSpec};
//! use reflex_control::types::JointConfig;
//!
//! let spec = ObjectiveSpec::new(Arc::new(JointStateFeature::new(6)), ObjectiveKind::Eq)
//!     .with_fixed_target(JointConfig::zeros(6))
//!     .with_name("hold-home");
//! ```

use std::sync::Arc;

use smallvec::SmallVec;

use super::target::MovingTargetPolicy;
use super::{ControlObjective, MovingTarget, ObjectiveKind, Target};
use crate::feature::Feature;
use crate::types::{CtrlError, JointConfig};
use crate::world::{FrameSelector, WorldModel};

/// 目标构造说明（builder）
///
/// 默认：绑定全部坐标系（[`FrameSelector::All`]）、无目标值、
/// 永不过期、无显示名（第一次 update 时从特征短标签懒赋值）。
pub struct ObjectiveSpec {
    feature: Arc<dyn Feature>,
    kind: ObjectiveKind,
    selector: FrameSelector,
    target: Target,
    transient_ticks: Option<u32>,
    name: Option<String>,
}

impl ObjectiveSpec {
    /// 创建说明
    pub fn new(feature: Arc<dyn Feature>, kind: ObjectiveKind) -> Self {
        ObjectiveSpec {
            feature,
            kind,
            selector: FrameSelector::All,
            target: Target::None,
            transient_ticks: None,
            name: None,
        }
    }

    /// 按名字绑定坐标系（默认绑定当前时间切片的全部坐标系）
    pub fn with_frames<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selector = FrameSelector::Frames(names.into_iter().map(Into::into).collect());
        self
    }

    /// 设置固定目标向量
    pub fn with_fixed_target(mut self, target: JointConfig) -> Self {
        self.target = Target::Fixed(target);
        self
    }

    /// 设置移动目标策略和初始 set-point
    pub fn with_moving_target<P>(mut self, policy: P, initial: JointConfig) -> Self
    where
        P: MovingTargetPolicy + 'static,
    {
        self.target = Target::Moving(MovingTarget {
            policy: Box::new(policy),
            current: initial,
        });
        self
    }

    /// 标记为瞬态：`ticks` 拍后自动停用
    pub fn with_transient(mut self, ticks: u32) -> Self {
        self.transient_ticks = Some(ticks);
        self
    }

    /// 设置显示名
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 对世界模型解析并构造目标
    ///
    /// # 错误
    ///
    /// - [`CtrlError::UnknownFrame`]: 坐标系名无法解析
    /// - [`CtrlError::DimensionMismatch`]: 目标值与特征维度不一致
    pub(crate) fn build(self, world: &dyn WorldModel) -> Result<ControlObjective, CtrlError> {
        let frames: SmallVec<[_; 4]> = self.selector.resolve(world)?.into_iter().collect();

        let mut obj = ControlObjective::new(self.feature, self.kind);
        obj.set_frames(frames);
        obj.set_target(self.target)?;
        obj.set_transient_ticks(self.transient_ticks);
        if let Some(name) = self.name {
            obj.set_name(name);
        }
        Ok(obj)
    }

    /// 特征的微分阶（供循环在接入时校验窗口长度）
    pub(crate) fn order(&self) -> usize {
        self.feature.order()
    }
}
