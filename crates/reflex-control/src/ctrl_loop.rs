//! 控制循环
//!
//! [`ControlLoop`] 是每拍驱动一次的反应式控制核心：
//!
//! 1. `update(q)` —— 推进滑动配置窗口、推进移动目标、跟踪状态
//! 2. `solve()` —— 把活跃目标打包下发给外部优化器，拿回下一步配置
//!
//! 调用方以周期 `tau` 调用这一对方法，把返回的配置下发给执行器
//! （硬件传输在本核心之外）。
//!
//! # 重入约定
//!
//! 单线程、协作式、tick 驱动。目标列表的增删不得与进行中的
//! `update`/`solve` 重叠——`&mut self` 天然强制了这一点；跨线程
//! 使用时由调用方在节拍之间串行化。
//!
//! # 诊断
//!
//! 退化求解（残差超阈值）是软性可恢复条件：告警 + 调用方可见的
//! 标志位，绝不 panic——快速 set-point 变化期间出现瞬时大残差是
//! 预期行为。阈值是每循环一份的显式配置，不是进程级全局开关。
//!
//! # 示例
//!
//! ```rust,ignore
//! use reflex_control::ctrl_loop::ControlLoop;
//!
//! let mut ctrl = ControlLoop::new(world, optimizer, 0.01, 2)?;
//! ctrl.add_q_control_objective(1, 0.1)?;
//!
//! loop {
//!     let q = read_joint_state();
//!     ctrl.update(&q)?;
//!     let next = ctrl.solve()?;
//!     send_to_actuators(&next);
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::feature::QControlFeature;
use crate::hooks::{StatusCallback, StatusEvent, StatusHooks};
use crate::objective::{ActStatus, ControlObjective, CtrlHandle, ObjectiveKind, ObjectiveSpec};
use crate::solver::{ObjectiveView, OptimizationProblem, Optimizer, SolveOptions, SolveReport};
use crate::types::{CtrlError, JointConfig};
use crate::window::ConfigWindow;
use crate::world::WorldModel;

/// 每循环一份的诊断配置
///
/// 取代进程级可变开关：退化求解的判定阈值跟着循环实例走。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// 残差超过此值即判定为退化求解（告警 + 标志位）
    pub sos_warn_threshold: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            sos_warn_threshold: 0.1,
        }
    }
}

/// 反应式控制循环
///
/// 持有滑动配置窗口和活跃目标列表；目标句柄是共享的
/// （见 [`CtrlHandle`]），循环不是它们的唯一拥有者。
pub struct ControlLoop {
    world: Arc<dyn WorldModel>,
    optimizer: Box<dyn Optimizer>,
    window: ConfigWindow,
    objectives: Vec<CtrlHandle>,
    solve_options: SolveOptions,
    diagnostics: DiagnosticsConfig,
    hooks: StatusHooks,
    last_report: Option<SolveReport>,
    degenerate: bool,
    tick: u64,
}

impl ControlLoop {
    /// 创建控制循环
    ///
    /// 绑定世界模型和优化器，建立定时，分配配置窗口并用世界模型
    /// 的当前关节状态播种全部槽位。
    ///
    /// # 参数
    ///
    /// - `tau`: 控制周期（秒，> 0）
    /// - `k_order`: 保留的历史配置数（微分阶目标需要 >= 其阶数）
    ///
    /// # 错误
    ///
    /// `tau <= 0` 返回 [`CtrlError::InvalidPeriod`]。
    pub fn new(
        world: Arc<dyn WorldModel>,
        optimizer: Box<dyn Optimizer>,
        tau: f64,
        k_order: usize,
    ) -> Result<Self, CtrlError> {
        let q0 = world.get_joint_state();
        let window = ConfigWindow::new(k_order, tau, q0)?;
        Ok(ControlLoop {
            world,
            optimizer,
            window,
            objectives: Vec::new(),
            solve_options: SolveOptions::default(),
            diagnostics: DiagnosticsConfig::default(),
            hooks: StatusHooks::new(),
            last_report: None,
            degenerate: false,
            tick: 0,
        })
    }

    /// 覆盖求解配置
    pub fn with_solve_options(mut self, options: SolveOptions) -> Self {
        self.solve_options = options;
        self
    }

    /// 覆盖诊断配置
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// 注册状态转移回调
    pub fn add_status_callback(&mut self, callback: Arc<dyn StatusCallback>) {
        self.hooks.add_callback(callback);
    }

    /// 控制周期（秒）
    pub fn tau(&self) -> f64 {
        self.window.tau()
    }

    /// 历史阶数
    pub fn k_order(&self) -> usize {
        self.window.k_order()
    }

    /// 配置窗口
    pub fn window(&self) -> &ConfigWindow {
        &self.window
    }

    /// 世界模型
    pub fn world(&self) -> &Arc<dyn WorldModel> {
        &self.world
    }

    /// 当前目标列表
    pub fn objectives(&self) -> &[CtrlHandle] {
        &self.objectives
    }

    /// 求解配置
    pub fn solve_options(&self) -> &SolveOptions {
        &self.solve_options
    }

    /// 已经历的节拍数
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// 最近一次求解报告
    pub fn last_report(&self) -> Option<&SolveReport> {
        self.last_report.as_ref()
    }

    /// 最近一次求解是否退化（残差超阈值）
    ///
    /// 软性标志：供上层介入/重规划，循环自身继续运行。
    pub fn last_solve_degenerate(&self) -> bool {
        self.degenerate
    }

    /// 按说明构造并接入一个目标
    ///
    /// 坐标系选择器在此处解析（fail-fast）：[`FrameSelector::All`]
    /// 绑定当前时间切片的全部坐标系（不显式给出坐标系列表时的
    /// 默认绑定）；按名字选择时任何未知名字立即报错。
    ///
    /// # 错误
    ///
    /// - [`CtrlError::WindowTooShort`]: 特征微分阶超过 `k_order`
    /// - [`CtrlError::UnknownFrame`]: 坐标系名无法解析
    /// - [`CtrlError::DimensionMismatch`]: 目标值维度不符
    ///
    /// [`FrameSelector::All`]: crate::world::FrameSelector::All
    pub fn add_objective(&mut self, spec: ObjectiveSpec) -> Result<CtrlHandle, CtrlError> {
        self.check_order(spec.order())?;
        let obj = spec.build(self.world.as_ref())?;
        let handle = obj.into_handle();
        self.objectives.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// 接入一个关节空间正则化目标
    ///
    /// 阶 1 = 速度阻尼，阶 2 = 加速度阻尼，维度取世界模型的
    /// 关节空间大小，约束类型 sum-of-squares。
    pub fn add_q_control_objective(
        &mut self,
        order: usize,
        scale: f64,
    ) -> Result<CtrlHandle, CtrlError> {
        let feat = QControlFeature::new(order, scale, self.world.joint_dim())?;
        self.check_order(order)?;
        let handle = ControlObjective::new(Arc::new(feat), ObjectiveKind::Sos).into_handle();
        self.objectives.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// 批量接入已存在的共享句柄
    ///
    /// 通常来自一个或多个 [`ObjectiveSet`](crate::set::ObjectiveSet)。
    ///
    /// # 错误
    ///
    /// 任何一个目标的特征微分阶超过 `k_order` 时整批拒绝
    /// （[`CtrlError::WindowTooShort`]）。
    pub fn add_objectives(&mut self, handles: &[CtrlHandle]) -> Result<(), CtrlError> {
        for h in handles {
            self.check_order(h.read().feature().order())?;
        }
        self.objectives.extend(handles.iter().cloned());
        Ok(())
    }

    /// 批量替换目标列表
    pub fn set_objectives(&mut self, handles: &[CtrlHandle]) -> Result<(), CtrlError> {
        for h in handles {
            self.check_order(h.read().feature().order())?;
        }
        self.objectives.clear();
        self.objectives.extend(handles.iter().cloned());
        Ok(())
    }

    /// 按引用身份移除目标
    ///
    /// 只匹配同一实例（`Arc::ptr_eq`）；其他容器仍持有的目标
    /// 不会被销毁，只是不再参与本循环。
    pub fn del_objectives(&mut self, handles: &[CtrlHandle]) {
        self.objectives
            .retain(|o| !handles.iter().any(|h| Arc::ptr_eq(o, h)));
    }

    fn check_order(&self, order: usize) -> Result<(), CtrlError> {
        if order > self.window.k_order() {
            return Err(CtrlError::WindowTooShort {
                required: order,
                available: self.window.k_order(),
            });
        }
        Ok(())
    }

    /// 推进一个控制节拍
    ///
    /// 1. 推进配置窗口：丢弃最老槽位，把 `current` 写入两个最新
    ///    槽位（单步、速率 `tau` 的回看播种）
    /// 2. 瞬态目标计数递减，到期停用
    /// 3. 对每个活跃目标：懒赋显示名；有移动目标策略的先刷新
    ///    `last_value` 再由策略给出下一状态；无策略的首次强制为
    ///    `Running`（此后幂等）。状态变化时触发已注册的钩子。
    ///
    /// # 错误
    ///
    /// `current` 维度与窗口不符返回 [`CtrlError::DimensionMismatch`]。
    pub fn update(&mut self, current: &JointConfig) -> Result<(), CtrlError> {
        if current.len() != self.window.dim() {
            return Err(CtrlError::DimensionMismatch {
                expected: self.window.dim(),
                actual: current.len(),
            });
        }

        self.window.push(current);
        self.tick += 1;

        for handle in &self.objectives {
            let mut o = handle.write();
            if !o.active() {
                continue;
            }

            // 瞬态过期
            if o.tick_transient() {
                o.set_active(false);
                tracing::debug!(
                    "Transient objective '{}' expired at tick {}",
                    o.name().unwrap_or("(unnamed)"),
                    self.tick
                );
                continue;
            }

            // 懒赋显示名
            if o.name().is_none() {
                let tag = o.feature().short_tag(self.world.as_ref());
                o.set_name(tag);
            }

            let prev = o.status();
            let next = match o.step_moving_target(&self.window) {
                Some(s) => s,
                // 无策略：首次活跃 tick 进入 running，之后保持
                None => ActStatus::Running,
            };

            if next != prev {
                o.set_status(next);
                let event = StatusEvent {
                    objective: o.name().unwrap_or("(unnamed)").to_string(),
                    from: prev,
                    to: next,
                    tick: self.tick,
                };
                // 先放锁再通知，回调可以自由读取目标
                drop(o);
                tracing::debug!(
                    "Objective '{}' status {} -> {}",
                    event.objective,
                    event.from,
                    event.to
                );
                self.hooks.notify(&event);
            }
        }

        Ok(())
    }

    /// 下发一次有界优化，返回下一步配置
    ///
    /// 工作目标列表只含当前活跃的目标——不活跃的被完全排除，
    /// 不是零权重。优化器同步执行，受
    /// [`SolveOptions`] 的迭代上限和步长界约束（见
    /// [`solver`](crate::solver) 模块文档的实时契约）。
    ///
    /// 返回的残差超过诊断阈值时记一次告警并置退化标志
    /// （[`last_solve_degenerate`](Self::last_solve_degenerate)），
    /// 不中断循环。
    pub fn solve(&mut self) -> Result<JointConfig, CtrlError> {
        let views: Vec<ObjectiveView> = self
            .objectives
            .iter()
            .filter_map(|h| {
                let o = h.read();
                o.active().then(|| ObjectiveView::of(&o))
            })
            .collect();

        let problem = OptimizationProblem::new(&self.window, views);
        let (q, report) = self.optimizer.minimize(&problem, &self.solve_options);

        self.degenerate = report.sos > self.diagnostics.sos_warn_threshold;
        if self.degenerate {
            tracing::warn!(
                "Degenerate solve at tick {}: sos {:.6} exceeds threshold {:.6}",
                self.tick,
                report.sos,
                self.diagnostics.sos_warn_threshold
            );
        }
        self.last_report = Some(report);

        Ok(q)
    }

    /// 输出每个目标的状态和最近一次求解报告（诊断用）
    pub fn report(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(w, "control objectives:")?;
        for h in &self.objectives {
            h.read().report_state(w)?;
        }
        writeln!(w, "optimization result:")?;
        match &self.last_report {
            Some(r) => writeln!(w, "  {r}"),
            None => writeln!(w, "  (none)"),
        }
    }
}
