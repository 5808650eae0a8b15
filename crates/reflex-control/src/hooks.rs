//! 状态转移钩子
//!
//! 目标状态的每次转移（如 `running -> converged`）都是可观察事件。
//! 本模块提供显式的观察者注册：回调注册到控制循环，转移发生时
//! 同步触发——绝不是不可观察的隐式副作用。
//!
//! # 设计原则
//!
//! - **非阻塞**: 回调在控制节拍内执行，必须快速返回；
//!   需要重活的订阅方用 [`ChannelStatusHook`] 把事件搬出循环线程
//! - **Channel 模式**: 有界通道 + `try_send`，订阅方跟不上时
//!   丢弃事件并告警，绝不阻塞控制节拍
//!
//! # 示例
//!
//! ```rust
//! use reflex_control::hooks::{ChannelStatusHook, StatusHooks};
//! use std::sync::Arc;
//!
//! let mut hooks = StatusHooks::new();
//! let (hook, rx) = ChannelStatusHook::new();
//! hooks.add_callback(Arc::new(hook));
//! # let _ = rx;
//! ```

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::objective::ActStatus;

/// 一次状态转移事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// 目标显示名
    pub objective: String,
    /// 转移前状态
    pub from: ActStatus,
    /// 转移后状态
    pub to: ActStatus,
    /// 发生转移的控制节拍计数
    pub tick: u64,
}

/// 状态转移回调接口
///
/// 实现必须快速返回（控制节拍内同步调用），禁止阻塞操作；
/// 推荐通过 channel 异步处理，见 [`ChannelStatusHook`]。
pub trait StatusCallback: Send + Sync {
    /// 状态转移发生时调用
    fn on_status_change(&self, event: &StatusEvent);
}

/// 回调注册表
///
/// 控制循环持有一个实例；回调用 `Arc` 共享，可注册任意多个。
#[derive(Default)]
pub struct StatusHooks {
    callbacks: Vec<Arc<dyn StatusCallback>>,
}

impl StatusHooks {
    /// 创建空注册表
    #[must_use]
    pub const fn new() -> Self {
        StatusHooks {
            callbacks: Vec::new(),
        }
    }

    /// 注册回调
    pub fn add_callback(&mut self, callback: Arc<dyn StatusCallback>) {
        self.callbacks.push(callback);
    }

    /// 移除所有回调（测试/清理用）
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 是否没有任何回调
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// 触发所有回调
    pub(crate) fn notify(&self, event: &StatusEvent) {
        for cb in &self.callbacks {
            cb.on_status_change(event);
        }
    }
}

/// 有界通道钩子
///
/// 把转移事件搬到控制线程之外。通道满或接收端掉线时用
/// `try_send` 丢弃事件并告警，绝不阻塞控制节拍。
pub struct ChannelStatusHook {
    sender: Sender<StatusEvent>,
}

impl ChannelStatusHook {
    /// 默认容量（256）的通道钩子
    pub fn new() -> (Self, Receiver<StatusEvent>) {
        Self::with_capacity(256)
    }

    /// 指定容量的通道钩子
    pub fn with_capacity(capacity: usize) -> (Self, Receiver<StatusEvent>) {
        let (sender, receiver) = bounded(capacity);
        (ChannelStatusHook { sender }, receiver)
    }
}

impl StatusCallback for ChannelStatusHook {
    fn on_status_change(&self, event: &StatusEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::warn!(
                    "Status event channel full, dropping event: {} {} -> {}",
                    ev.objective,
                    ev.from,
                    ev.to
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Status event receiver disconnected, dropping event");
            }
        }
    }
}
