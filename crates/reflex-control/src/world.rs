//! 世界模型接口
//!
//! 控制核心不拥有场景：关节状态、坐标系枚举和名字解析都委托给
//! 外部世界模型。本模块只定义能力接口（capability trait）和
//! 坐标系选择器。
//!
//! # 设计理念
//!
//! - **消费而不实现**: 世界模型由运动学层提供，核心只通过 trait 使用
//! - **fail-fast 解析**: 名字到索引的解析在目标构造时完成，
//!   未知名字立即报错，不推迟到求解
//! - **索引而非名字**: 求值路径只携带 [`FrameId`]，避免字符串比较

use crate::types::{CtrlError, FrameId, JointConfig};

/// 世界模型能力接口
///
/// 外部运动学/场景层实现此 trait。核心通过它读取当前关节状态、
/// 枚举当前时间切片的坐标系，以及把名字解析成索引。
pub trait WorldModel: Send + Sync {
    /// 关节空间维度
    fn joint_dim(&self) -> usize;

    /// 当前关节状态
    fn get_joint_state(&self) -> JointConfig;

    /// 按名字解析坐标系索引
    ///
    /// # 错误
    ///
    /// 任何一个名字无法解析时返回 [`CtrlError::UnknownFrame`]，
    /// 并指出第一个未解析的名字。
    fn frame_ids(&self, names: &[&str]) -> Result<Vec<FrameId>, CtrlError>;

    /// 当前时间切片的全部坐标系
    fn all_frames(&self) -> Vec<FrameId>;

    /// 索引到名字的反查（诊断用）
    fn frame_name(&self, id: FrameId) -> Option<String>;
}

/// 坐标系选择器
///
/// 目标构造时指定特征绑定到哪些坐标系。[`FrameSelector::All`] 是
/// 默认绑定：不显式给出坐标系列表时，特征绑定当前时间切片的
/// 全部坐标系。
#[derive(Debug, Clone, Default)]
pub enum FrameSelector {
    /// 绑定当前时间切片的所有坐标系
    #[default]
    All,
    /// 按名字绑定一组坐标系
    Frames(Vec<String>),
}

impl FrameSelector {
    /// 对世界模型解析出索引列表
    ///
    /// # 错误
    ///
    /// [`FrameSelector::Frames`] 中任何一个名字未知时返回
    /// [`CtrlError::UnknownFrame`]（fail-fast，见模块文档）。
    pub fn resolve(&self, world: &dyn WorldModel) -> Result<Vec<FrameId>, CtrlError> {
        match self {
            FrameSelector::All => Ok(world.all_frames()),
            FrameSelector::Frames(names) => {
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                world.frame_ids(&refs)
            }
        }
    }
}
