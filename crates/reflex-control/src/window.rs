//! 滑动配置窗口
//!
//! 控制循环保留最近 `k_order + 1` 个关节配置，按相对时间偏移索引：
//! 偏移 `0` 是当前配置，`-k_order` 是最老的配置。微分阶目标
//! （速度/加速度阻尼）用窗口里的有限差分求值。
//!
//! # 实现
//!
//! 固定大小的环形缓冲（arena + head 索引），`push` 不搬移数据，
//! 只前进 head 并覆写两个最新槽位。
//!
//! # 推进语义
//!
//! 每个控制节拍 `push(q)` 一次：最老的槽位被丢弃，新配置同时写入
//! 偏移 `0` 和 `-1` —— 这是单步、速率 `tau` 的回看播种：刚推进完的
//! 瞬间，"上一拍"和"当前拍"都是实测配置，有限差分从零速度起步。
//!
//! # 示例
//!
//! ```rust
//! use reflex_control::window::ConfigWindow;
//! use reflex_control::types::JointConfig;
//!
//! let q0 = JointConfig::zeros(2);
//! let mut win = ConfigWindow::new(2, 0.01, q0).unwrap();
//!
//! let q1 = JointConfig::from_vec(vec![0.1, 0.0]);
//! win.push(&q1);
//! assert_eq!(win.offset(0), &q1);
//! assert_eq!(win.offset(-1), &q1);
//! ```

use crate::types::{CtrlError, JointConfig};

/// 滑动配置窗口
///
/// `k_order + 1` 个配置槽位的环形缓冲，携带控制周期 `tau`
/// 以便微分阶特征构造有限差分。
#[derive(Debug, Clone)]
pub struct ConfigWindow {
    /// 槽位 arena（物理顺序，不随 push 搬移）
    slots: Vec<JointConfig>,
    /// 逻辑头（偏移 0 对应的物理索引由 head 推导）
    head: usize,
    /// 保留的历史阶数
    k_order: usize,
    /// 控制周期（秒）
    tau: f64,
}

impl ConfigWindow {
    /// 创建窗口，所有槽位用初始配置填充
    ///
    /// # 参数
    ///
    /// - `k_order`: 保留的历史配置数（>= 0）
    /// - `tau`: 控制周期（秒，> 0）
    /// - `initial`: 初始配置，复制进每个槽位
    ///
    /// # 错误
    ///
    /// `tau <= 0` 返回 [`CtrlError::InvalidPeriod`]。
    pub fn new(k_order: usize, tau: f64, initial: JointConfig) -> Result<Self, CtrlError> {
        if tau <= 0.0 {
            return Err(CtrlError::InvalidPeriod { tau });
        }
        let slots = vec![initial; k_order + 1];
        Ok(ConfigWindow {
            slots,
            head: 0,
            k_order,
            tau,
        })
    }

    /// 历史阶数
    #[inline]
    pub fn k_order(&self) -> usize {
        self.k_order
    }

    /// 控制周期（秒）
    #[inline]
    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// 关节空间维度
    #[inline]
    pub fn dim(&self) -> usize {
        self.slots[0].len()
    }

    /// 偏移到物理索引
    ///
    /// `offset` 必须在 `[-k_order, 0]` 内。
    #[inline]
    fn phys(&self, offset: i64) -> usize {
        debug_assert!(
            -(self.k_order as i64) <= offset && offset <= 0,
            "window offset {} out of range [-{}, 0]",
            offset,
            self.k_order
        );
        let len = self.slots.len();
        // head + k_order >= |offset|，和一定非负
        ((self.head + self.k_order) as i64 + offset) as usize % len
    }

    /// 按相对偏移读取配置
    ///
    /// 偏移 `0` 是当前配置，负偏移往回看。越界 panic（编程错误）。
    pub fn offset(&self, offset: i64) -> &JointConfig {
        assert!(
            -(self.k_order as i64) <= offset && offset <= 0,
            "window offset {} out of range [-{}, 0]",
            offset,
            self.k_order
        );
        &self.slots[self.phys(offset)]
    }

    /// 当前配置（偏移 0）
    #[inline]
    pub fn current(&self) -> &JointConfig {
        self.offset(0)
    }

    /// 推进一个节拍
    ///
    /// 丢弃最老的槽位，把 `q` 写入偏移 `0` 和 `-1`（见模块文档）。
    /// `k_order == 0` 时只有一个槽位，直接覆写。
    pub fn push(&mut self, q: &JointConfig) {
        self.head = (self.head + 1) % self.slots.len();
        let i0 = self.phys(0);
        self.slots[i0].clone_from(q);
        if self.k_order >= 1 {
            let i1 = self.phys(-1);
            self.slots[i1].clone_from(q);
        }
    }

    /// 用试探配置替换偏移 0，生成求解用的临时窗口
    ///
    /// 求解器在迭代中反复对候选配置求残差，历史槽位保持不变。
    pub fn with_current(&self, q: &JointConfig) -> ConfigWindow {
        let mut trial = self.clone();
        let i0 = trial.phys(0);
        trial.slots[i0].clone_from(q);
        trial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(v: f64) -> JointConfig {
        JointConfig::from_vec(vec![v, v * 10.0])
    }

    #[test]
    fn test_window_rejects_nonpositive_tau() {
        assert!(matches!(
            ConfigWindow::new(1, 0.0, q(0.0)),
            Err(CtrlError::InvalidPeriod { .. })
        ));
        assert!(matches!(
            ConfigWindow::new(1, -0.01, q(0.0)),
            Err(CtrlError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn test_window_initial_fill() {
        let win = ConfigWindow::new(2, 0.01, q(7.0)).unwrap();
        assert_eq!(win.offset(0), &q(7.0));
        assert_eq!(win.offset(-1), &q(7.0));
        assert_eq!(win.offset(-2), &q(7.0));
    }

    /// 三次推进后：{q3 @ 0, q3 @ -1, q2 @ -2}，最老的被丢弃，
    /// 当前配置复制进两个最新槽位。
    #[test]
    fn test_window_shift_and_duplicate() {
        let mut win = ConfigWindow::new(2, 0.01, q(0.0)).unwrap();
        win.push(&q(1.0));
        win.push(&q(2.0));
        win.push(&q(3.0));

        assert_eq!(win.offset(0), &q(3.0));
        assert_eq!(win.offset(-1), &q(3.0));
        assert_eq!(win.offset(-2), &q(2.0));
    }

    #[test]
    fn test_window_intermediate_history() {
        let mut win = ConfigWindow::new(2, 0.01, q(0.0)).unwrap();
        win.push(&q(1.0));
        // 推进一次后，-2 还保留着初始配置
        assert_eq!(win.offset(0), &q(1.0));
        assert_eq!(win.offset(-1), &q(1.0));
        assert_eq!(win.offset(-2), &q(0.0));

        win.push(&q(2.0));
        assert_eq!(win.offset(-2), &q(1.0));
    }

    #[test]
    fn test_window_zero_order() {
        let mut win = ConfigWindow::new(0, 0.01, q(0.0)).unwrap();
        win.push(&q(5.0));
        assert_eq!(win.current(), &q(5.0));
    }

    #[test]
    fn test_with_current_leaves_history() {
        let mut win = ConfigWindow::new(1, 0.01, q(0.0)).unwrap();
        win.push(&q(1.0));

        let trial = win.with_current(&q(9.0));
        assert_eq!(trial.offset(0), &q(9.0));
        assert_eq!(trial.offset(-1), &q(1.0));
        // 原窗口不受影响
        assert_eq!(win.offset(0), &q(1.0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_offset_out_of_range_panics() {
        let win = ConfigWindow::new(1, 0.01, q(0.0)).unwrap();
        let _ = win.offset(-2);
    }
}
