//! 循环运行器
//!
//! 把 `update` / `solve` / 下发命令包装成一个以周期 `tau` 阻塞
//! 运行的循环。使用 `spin_sleep` 获得低抖动定时。
//!
//! 这是可选的便利层：嵌入方完全可以自己驱动
//! [`ControlLoop`](crate::ctrl_loop::ControlLoop)（例如挂在硬件
//! 中断或实时调度器上），运行器只是把最常见的"固定频率跑到
//! 停止条件"写好。
//!
//! # 实时性
//!
//! 运行器观察而不保证实时界：单拍计算时间超过 `tau` 时告警
//! （可关）。保证 `迭代上限 × 单次迭代成本 < tau` 是配置求解
//! 选项的调用方的责任。
//!
//! # 示例
//!
//! ```rust,ignore
//! use reflex_control::runner::{run_loop, RunConfig};
//!
//! let config = RunConfig {
//!     max_ticks: Some(1000),
//!     warn_overrun: true,
//! };
//! run_loop(&mut ctrl, &mut sink, config)?;
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use spin_sleep::SpinSleeper;

use crate::ctrl_loop::ControlLoop;
use crate::types::{CtrlError, JointConfig};

/// 运行器配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// 最大节拍数（`None` = 无限循环）
    pub max_ticks: Option<u64>,
    /// 单拍计算超过 `tau` 时是否告警
    pub warn_overrun: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            max_ticks: None,
            warn_overrun: true,
        }
    }
}

/// 命令下发接口
///
/// 执行器一侧的最小契约：每拍接收恰好一个下一步配置。
/// 硬件传输、协议编码都在它后面，不属于本核心。
pub trait CommandSink {
    /// 下发一个配置
    fn command(&mut self, q: &JointConfig) -> Result<(), CtrlError>;
}

/// 以周期 `tau` 阻塞运行控制循环
///
/// 每拍：读世界模型关节状态 -> `update` -> `solve` -> 下发。
/// 直到达到 `max_ticks` 或出错返回。
///
/// # 返回
///
/// - `Ok(())`: 达到 `max_ticks` 正常结束
/// - `Err(e)`: `update`/`solve`/下发任何一步出错，立即返回
pub fn run_loop(
    ctrl: &mut ControlLoop,
    sink: &mut dyn CommandSink,
    config: RunConfig,
) -> Result<(), CtrlError> {
    let tau = ctrl.tau();
    if tau < 1e-4 {
        tracing::warn!(
            "Very high control rate: {:.0} Hz. This may cause performance issues.",
            1.0 / tau
        );
    }

    let period = Duration::from_secs_f64(tau);
    let sleeper = SpinSleeper::default();
    let mut ticks = 0u64;

    loop {
        if let Some(max) = config.max_ticks
            && ticks >= max
        {
            return Ok(());
        }

        let start = Instant::now();

        // 1. 读当前关节状态
        let q = ctrl.world().get_joint_state();

        // 2. 推进 + 求解
        ctrl.update(&q)?;
        let next = ctrl.solve()?;

        // 3. 下发
        sink.command(&next)?;

        // 4. 计时与休眠
        let elapsed = start.elapsed();
        if config.warn_overrun && elapsed > period {
            tracing::warn!(
                "Control cycle overran at tick {}: {:?} > {:?}",
                ticks,
                elapsed,
                period
            );
        }
        ticks += 1;
        sleeper.sleep(period.saturating_sub(elapsed));
    }
}
