//! 控制目标模型
//!
//! 一个 [`ControlObjective`] 是参与优化的一项可微项：特征 + 约束
//! 类型 + 目标值（set-point）+ 运行状态。目标本身不含求解逻辑，
//! 是被 [`ControlLoop`](crate::ctrl_loop::ControlLoop) 的 `solve()`
//! 消费的纯数据/状态载体。
//!
//! # 所有权
//!
//! 目标的句柄类型是 [`CtrlHandle`]（`Arc<RwLock<_>>`）：一个控制
//! 循环和任意多个 [`ObjectiveSet`](crate::set::ObjectiveSet) 可以
//! 引用同一实例；从一个容器移除绝不销毁其他容器仍持有的目标，
//! 实例只在最后一个引用释放时销毁。
//!
//! # 状态机
//!
//! ```text
//! Init ──首次活跃 tick──> Running ──策略报告──> Converged / Stalled
//!                            ^                      │
//!                            └──────策略报告─────────┘
//! ```
//!
//! - 无移动目标策略的目标：首次活跃 tick 进入 `Running`，
//!   之后保持 `Running`（幂等，不再触发转移）
//! - 有策略的目标：每个 tick 由策略的 `step` 返回下一状态
//! - 不存在回到 `Init` 的转移；循环不会自行把目标从 `Stalled`
//!   恢复出来，只有策略能决定离开
//!
//! 状态转移是可观察事件，由循环通过
//! [`StatusHooks`](crate::hooks::StatusHooks) 通知。

pub mod spec;
pub mod target;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::feature::{EvalContext, Feature};
use crate::types::config::inf_norm;
use crate::types::{CtrlError, FrameId, JointConfig};
use crate::window::ConfigWindow;

pub use spec::ObjectiveSpec;
pub use target::MovingTargetPolicy;

/// 目标运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActStatus {
    /// 已创建，尚未在活跃状态下经历 update
    Init,
    /// 正在参与控制
    Running,
    /// 策略判定已收敛
    Converged,
    /// 策略判定停滞（循环不会自行恢复）
    Stalled,
}

impl fmt::Display for ActStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActStatus::Init => "init",
            ActStatus::Running => "running",
            ActStatus::Converged => "converged",
            ActStatus::Stalled => "stalled",
        };
        write!(f, "{s}")
    }
}

/// 约束类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectiveKind {
    /// 等式约束：残差驱动到零
    Eq,
    /// 不等式约束：每个分量保持 <= 0
    Ineq,
    /// 平方和代价：最小化残差的平方和
    Sos,
}

impl fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectiveKind::Eq => "eq",
            ObjectiveKind::Ineq => "ineq",
            ObjectiveKind::Sos => "sos",
        };
        write!(f, "{s}")
    }
}

/// 移动目标：策略 + 当前 set-point
pub struct MovingTarget {
    /// 每个 tick 推进 set-point 的策略
    pub policy: Box<dyn MovingTargetPolicy>,
    /// 当前 set-point
    pub current: JointConfig,
}

/// 目标值
///
/// 三者互斥（由枚举保证）：固定目标向量、移动目标策略、
/// 或者没有目标（直接最小化/约束特征原始值）。
pub enum Target {
    /// 无目标：按原始特征值计算残差
    None,
    /// 固定目标向量
    Fixed(JointConfig),
    /// 移动目标策略
    Moving(MovingTarget),
}

impl Target {
    /// 当前 set-point（如果有）
    pub fn current(&self) -> Option<&JointConfig> {
        match self {
            Target::None => None,
            Target::Fixed(v) => Some(v),
            Target::Moving(mt) => Some(&mt.current),
        }
    }
}

/// 共享目标句柄
///
/// 引用计数 + 内部锁；锁在单线程 tick 驱动下无竞争，
/// 换来的是可跨容器共享、`Send + Sync` 的句柄。
pub type CtrlHandle = Arc<RwLock<ControlObjective>>;

/// 一项控制目标
///
/// 见模块文档。构造走 [`ObjectiveSet`](crate::set::ObjectiveSet) 或
/// [`ControlLoop`](crate::ctrl_loop::ControlLoop) 的工厂方法。
pub struct ControlObjective {
    feature: Arc<dyn Feature>,
    kind: ObjectiveKind,
    target: Target,
    status: ActStatus,
    active: bool,
    last_value: Option<JointConfig>,
    name: Option<String>,
    frames: SmallVec<[FrameId; 4]>,
    transient_ticks: Option<u32>,
}

impl fmt::Debug for ControlObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlObjective")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("active", &self.active)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ControlObjective {
    /// 创建目标（无目标值，无坐标系绑定，活跃，状态 `Init`）
    pub fn new(feature: Arc<dyn Feature>, kind: ObjectiveKind) -> Self {
        ControlObjective {
            feature,
            kind,
            target: Target::None,
            status: ActStatus::Init,
            active: true,
            last_value: None,
            name: None,
            frames: SmallVec::new(),
            transient_ticks: None,
        }
    }

    /// 包装成共享句柄
    pub fn into_handle(self) -> CtrlHandle {
        Arc::new(RwLock::new(self))
    }

    /// 特征
    pub fn feature(&self) -> &Arc<dyn Feature> {
        &self.feature
    }

    /// 约束类型
    pub fn kind(&self) -> ObjectiveKind {
        self.kind
    }

    /// 当前状态
    pub fn status(&self) -> ActStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ActStatus) {
        self.status = status;
    }

    /// 是否活跃
    ///
    /// 不活跃的目标被完全排除在优化之外，不是零权重。
    pub fn active(&self) -> bool {
        self.active
    }

    /// 激活/停用
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// 显示名（第一次 update 时从特征短标签懒赋值）
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 设置显示名
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// 坐标系绑定
    pub fn frames(&self) -> &[FrameId] {
        &self.frames
    }

    pub(crate) fn set_frames(&mut self, frames: SmallVec<[FrameId; 4]>) {
        self.frames = frames;
    }

    /// 目标值
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// 设置目标值
    ///
    /// # 错误
    ///
    /// 固定/移动目标的维度与特征维度不一致时返回
    /// [`CtrlError::DimensionMismatch`]。
    pub fn set_target(&mut self, target: Target) -> Result<(), CtrlError> {
        let expected = self.feature.dim();
        if let Some(v) = target.current()
            && v.len() != expected
        {
            return Err(CtrlError::DimensionMismatch {
                expected,
                actual: v.len(),
            });
        }
        self.target = target;
        Ok(())
    }

    /// 剩余的瞬态 tick 数（`None` = 永不过期）
    pub fn transient_ticks(&self) -> Option<u32> {
        self.transient_ticks
    }

    pub(crate) fn set_transient_ticks(&mut self, ticks: Option<u32>) {
        self.transient_ticks = ticks;
    }

    /// 瞬态计数递减一拍，归零时返回 true（目标应过期）
    pub(crate) fn tick_transient(&mut self) -> bool {
        match self.transient_ticks {
            Some(0) | Some(1) => {
                self.transient_ticks = Some(0);
                true
            }
            Some(n) => {
                self.transient_ticks = Some(n - 1);
                false
            }
            None => false,
        }
    }

    /// 求值并缓存
    ///
    /// 对窗口当前配置求特征值，更新 `last_value` 缓存并返回它。
    pub fn refresh_value(&mut self, window: &ConfigWindow) -> &JointConfig {
        let eval = self
            .feature
            .eval(&EvalContext::new(window, &self.frames));
        self.last_value.insert(eval.y)
    }

    /// 最近一次缓存的特征值
    pub fn last_value(&self) -> Option<&JointConfig> {
        self.last_value.as_ref()
    }

    /// 推进移动目标策略一拍
    ///
    /// 无移动目标时返回 `None`。有策略时先刷新 `last_value`
    /// （策略需要实测值），再调用策略并返回它报告的下一状态。
    pub(crate) fn step_moving_target(&mut self, window: &ConfigWindow) -> Option<ActStatus> {
        if !matches!(self.target, Target::Moving(_)) {
            return None;
        }
        let y = self.refresh_value(window).clone();
        let tau = window.tau();
        match &mut self.target {
            Target::Moving(mt) => Some(mt.policy.step(tau, &mut mt.current, &y)),
            _ => None,
        }
    }

    /// 纯求值残差（不更新缓存）
    ///
    /// 有目标值时为 `y - target`，否则为原始特征值。
    pub fn residual(&self, window: &ConfigWindow) -> JointConfig {
        let eval = self
            .feature
            .eval(&EvalContext::new(window, &self.frames));
        match self.target.current() {
            Some(t) => eval.y - t,
            None => eval.y,
        }
    }

    /// 残差是否在精度内（按约束类型判定）
    ///
    /// - `Eq` / `Sos`: 残差无穷范数 <= `precision`
    /// - `Ineq`: 每个分量 <= `precision`
    pub fn within_precision(&self, window: &ConfigWindow, precision: f64) -> bool {
        let r = self.residual(window);
        match self.kind {
            ObjectiveKind::Eq | ObjectiveKind::Sos => inf_norm(&r) <= precision,
            ObjectiveKind::Ineq => r.iter().all(|v| *v <= precision),
        }
    }

    /// 输出一行状态（诊断用，无控制副作用）
    pub fn report_state(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        write!(
            w,
            "  {}  kind={}  status={}  active={}",
            self.name.as_deref().unwrap_or("(unnamed)"),
            self.kind,
            self.status,
            self.active,
        )?;
        if let Some(y) = &self.last_value {
            write!(w, "  y=[")?;
            for (i, v) in y.iter().enumerate() {
                if i > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{v:.4}")?;
            }
            write!(w, "]")?;
        }
        writeln!(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::JointStateFeature;

    fn obj(kind: ObjectiveKind) -> ControlObjective {
        ControlObjective::new(Arc::new(JointStateFeature::new(2)), kind)
    }

    fn window(vals: &[f64]) -> ConfigWindow {
        ConfigWindow::new(0, 0.01, JointConfig::from_vec(vals.to_vec())).unwrap()
    }

    #[test]
    fn test_new_objective_defaults() {
        let o = obj(ObjectiveKind::Eq);
        assert_eq!(o.status(), ActStatus::Init);
        assert!(o.active());
        assert!(o.name().is_none());
        assert!(o.last_value().is_none());
        assert!(o.transient_ticks().is_none());
    }

    #[test]
    fn test_residual_against_fixed_target() {
        let mut o = obj(ObjectiveKind::Eq);
        o.set_target(Target::Fixed(JointConfig::from_vec(vec![1.0, 0.0])))
            .unwrap();
        let r = o.residual(&window(&[0.4, 0.0]));
        assert!((r[0] + 0.6).abs() < 1e-12);
        assert!(r[1].abs() < 1e-12);
    }

    #[test]
    fn test_set_target_dimension_check() {
        let mut o = obj(ObjectiveKind::Eq);
        let err = o
            .set_target(Target::Fixed(JointConfig::from_vec(vec![1.0])))
            .unwrap_err();
        assert!(matches!(
            err,
            CtrlError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_within_precision_eq() {
        let mut o = obj(ObjectiveKind::Eq);
        o.set_target(Target::Fixed(JointConfig::from_vec(vec![0.5, 0.0])))
            .unwrap();
        assert!(o.within_precision(&window(&[0.5, 0.0]), 1e-4));
        assert!(!o.within_precision(&window(&[0.51, 0.0]), 1e-4));
    }

    #[test]
    fn test_within_precision_ineq_is_one_sided() {
        let o = obj(ObjectiveKind::Ineq);
        // 负值满足不等式约束
        assert!(o.within_precision(&window(&[-3.0, -0.1]), 1e-4));
        // 正值违反
        assert!(!o.within_precision(&window(&[0.2, -0.1]), 1e-4));
    }

    #[test]
    fn test_refresh_value_caches() {
        let mut o = obj(ObjectiveKind::Sos);
        let win = window(&[0.3, -0.2]);
        o.refresh_value(&win);
        let y = o.last_value().unwrap();
        assert!((y[0] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_transient_countdown() {
        let mut o = obj(ObjectiveKind::Eq);
        o.set_transient_ticks(Some(2));
        assert!(!o.tick_transient());
        assert!(o.tick_transient());
        // 归零后保持过期
        assert!(o.tick_transient());
    }

    #[test]
    fn test_report_state_format() {
        let mut o = obj(ObjectiveKind::Eq);
        o.set_name("hold-pose");
        let mut out = String::new();
        o.report_state(&mut out).unwrap();
        assert!(out.contains("hold-pose"));
        assert!(out.contains("kind=eq"));
        assert!(out.contains("status=init"));
    }
}
