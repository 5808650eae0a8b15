//! 关节配置和坐标系标识
//!
//! 控制核心只处理数值化的关节空间：一个配置就是一个 `f64` 向量，
//! 维度由世界模型（[`WorldModel`](crate::world::WorldModel)）决定。
//!
//! # 示例
//!
//! ```rust
//! use reflex_control::types::{FrameId, JointConfig};
//!
//! let q = JointConfig::from_vec(vec![0.0, 0.5, -0.3]);
//! assert_eq!(q.len(), 3);
//!
//! let base = FrameId(0);
//! assert_eq!(base.index(), 0);
//! ```

use std::fmt;

/// 关节配置
///
/// 一个机器人时间切片的完整关节状态（弧度或米，由具体关节决定）。
/// 残差和雅可比矩阵使用同一维度约定。
pub type JointConfig = nalgebra::DVector<f64>;

/// 坐标系标识
///
/// 世界模型中一个坐标系（frame）的稳定索引。名字到索引的解析
/// 只在目标构造时发生一次，之后求值路径只携带索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    /// 获取索引（usize）
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 残差向量的无穷范数
///
/// 空向量返回 0.0（空残差视为完全满足）。
pub(crate) fn inf_norm(v: &JointConfig) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}
