//! 移动目标策略
//!
//! 策略在每个控制节拍推进一次目标的 set-point，并报告目标的下一
//! 状态。这是把"到哪去"与"怎么去"解耦的地方：目标只持有当前
//! set-point，策略决定它如何随时间移动、何时算收敛、何时算停滞。
//!
//! # 内置策略
//!
//! - [`ConstVelTarget`]: 以限速逼近终点，可选停滞检测
//! - [`CubicProfileTarget`]: 定时三次曲线（首末速度为零），到时保持终点
//!
//! # 示例
//!
//! ```rust
//! use reflex_control::objective::target::{ConstVelTarget, MovingTargetPolicy};
//! use reflex_control::objective::ActStatus;
//! use reflex_control::types::JointConfig;
//!
//! let mut policy = ConstVelTarget::new(JointConfig::from_vec(vec![1.0])).with_speed(0.5);
//! let mut target = JointConfig::from_vec(vec![0.0]);
//! let value = JointConfig::from_vec(vec![0.0]);
//!
//! // tau = 0.1，每拍最多移动 0.05
//! let status = policy.step(0.1, &mut target, &value);
//! assert_eq!(status, ActStatus::Running);
//! assert!((target[0] - 0.05).abs() < 1e-12);
//! ```

use super::ActStatus;
use crate::types::JointConfig;
use crate::types::config::inf_norm;

/// 移动目标策略接口
///
/// 每个控制节拍被调用一次。实现可以自由改写 `target`（当前
/// set-point），返回值成为目标的下一状态。
pub trait MovingTargetPolicy: Send + Sync {
    /// 推进一拍
    ///
    /// # 参数
    ///
    /// - `tau`: 控制周期（秒）
    /// - `target`: 当前 set-point，可原地改写
    /// - `current_value`: 目标特征的最近实测值
    ///
    /// # 返回
    ///
    /// 目标的下一状态。返回 [`ActStatus::Stalled`] 后循环不会
    /// 自行恢复；只有后续 `step` 返回别的状态才能离开。
    fn step(
        &mut self,
        tau: f64,
        target: &mut JointConfig,
        current_value: &JointConfig,
    ) -> ActStatus;
}

/// 限速逼近策略
///
/// 每拍把 set-point 向终点移动至多 `speed * tau`（逐分量）。
/// 终点到达且实测值跟踪在精度内时报告收敛。
///
/// # 停滞检测
///
/// 开启后（[`with_stall_patience`](Self::with_stall_patience)），
/// 跟踪误差连续若干拍没有改善且未收敛时报告 [`ActStatus::Stalled`]；
/// 误差一旦重新改善就回到 [`ActStatus::Running`]。
#[derive(Debug, Clone)]
pub struct ConstVelTarget {
    goal: JointConfig,
    speed: f64,
    precision: f64,
    stall_patience: Option<u32>,
    best_err: f64,
    ticks_since_improve: u32,
}

impl ConstVelTarget {
    /// 创建策略
    ///
    /// 默认：速度 1.0 /s，精度 1e-4，不做停滞检测。
    pub fn new(goal: JointConfig) -> Self {
        ConstVelTarget {
            goal,
            speed: 1.0,
            precision: 1e-4,
            stall_patience: None,
            best_err: f64::INFINITY,
            ticks_since_improve: 0,
        }
    }

    /// 设置 set-point 移动速度（单位/秒）
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// 设置收敛精度
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// 开启停滞检测：误差连续 `ticks` 拍无改善即报告停滞
    pub fn with_stall_patience(mut self, ticks: u32) -> Self {
        self.stall_patience = Some(ticks);
        self
    }

    /// 终点
    pub fn goal(&self) -> &JointConfig {
        &self.goal
    }
}

impl MovingTargetPolicy for ConstVelTarget {
    fn step(
        &mut self,
        tau: f64,
        target: &mut JointConfig,
        current_value: &JointConfig,
    ) -> ActStatus {
        debug_assert_eq!(target.len(), self.goal.len());
        let max_delta = self.speed * tau;

        // 1. set-point 向终点限速移动
        for (t, g) in target.iter_mut().zip(self.goal.iter()) {
            let delta = (g - *t).clamp(-max_delta, max_delta);
            *t += delta;
        }

        // 2. 收敛判定：set-point 已到终点且实测值跟踪在精度内
        let at_goal = target
            .iter()
            .zip(self.goal.iter())
            .all(|(t, g)| (t - g).abs() <= 1e-12);
        let err = inf_norm(&(current_value - &*target));
        if at_goal && err <= self.precision {
            return ActStatus::Converged;
        }

        // 3. 停滞检测
        if let Some(patience) = self.stall_patience {
            if err + 1e-12 < self.best_err {
                self.best_err = err;
                self.ticks_since_improve = 0;
            } else {
                self.ticks_since_improve += 1;
                if self.ticks_since_improve >= patience {
                    return ActStatus::Stalled;
                }
            }
        }

        ActStatus::Running
    }
}

/// 定时三次曲线策略
///
/// set-point 沿三次多项式从激活瞬间的值运动到终点，首末速度为零：
///
/// ```text
/// p(s) = p0 + (p1 - p0) * (3s² - 2s³),  s = elapsed / duration ∈ [0, 1]
/// ```
///
/// 到时后保持终点；曲线走完且实测值跟踪在精度内时报告收敛。
#[derive(Debug, Clone)]
pub struct CubicProfileTarget {
    goal: JointConfig,
    duration: f64,
    precision: f64,
    elapsed: f64,
    start: Option<JointConfig>,
}

impl CubicProfileTarget {
    /// 创建策略
    ///
    /// 起点在第一次 `step` 时从当时的 set-point 捕获。
    /// 默认精度 1e-4。
    pub fn new(goal: JointConfig, duration: f64) -> Self {
        assert!(duration > 0.0, "duration must be positive, got: {duration}");
        CubicProfileTarget {
            goal,
            duration,
            precision: 1e-4,
            elapsed: 0.0,
            start: None,
        }
    }

    /// 设置收敛精度
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// 曲线进度（0.0 到 1.0）
    pub fn progress(&self) -> f64 {
        (self.elapsed / self.duration).min(1.0)
    }
}

impl MovingTargetPolicy for CubicProfileTarget {
    fn step(
        &mut self,
        tau: f64,
        target: &mut JointConfig,
        current_value: &JointConfig,
    ) -> ActStatus {
        let start = self.start.get_or_insert_with(|| target.clone());

        self.elapsed += tau;
        let s = (self.elapsed / self.duration).min(1.0);
        // 边界条件 p(0)=p0, v(0)=0, p(1)=p1, v(1)=0 下的三次多项式
        let h = 3.0 * s * s - 2.0 * s * s * s;

        for ((t, p0), p1) in target.iter_mut().zip(start.iter()).zip(self.goal.iter()) {
            *t = p0 + (p1 - p0) * h;
        }

        let done = s >= 1.0;
        if done && inf_norm(&(current_value - &*target)) <= self.precision {
            ActStatus::Converged
        } else {
            ActStatus::Running
        }
    }
}
