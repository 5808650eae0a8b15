//! 测试基础设施
//!
//! 模拟世界模型、线性特征和参考下降求解器。求解算法不属于库的
//! 交付面（优化器是外部协作者），这里的实现只为把控制循环端到端
//! 跑起来。

#![allow(dead_code)]

use std::sync::Mutex;

use nalgebra::{DMatrix, DVector};

use reflex_control::feature::{EvalContext, Feature, FeatureEval};
use reflex_control::objective::ObjectiveKind;
use reflex_control::solver::{OptimizationProblem, Optimizer, SolveOptions, SolveReport};
use reflex_control::types::{CtrlError, FrameId, JointConfig};
use reflex_control::world::WorldModel;

/// 模拟世界模型
///
/// 固定的坐标系名表 + 可设置的关节状态。
pub struct MockWorld {
    dim: usize,
    frames: Vec<&'static str>,
    state: Mutex<JointConfig>,
}

impl MockWorld {
    pub fn new(dim: usize) -> Self {
        MockWorld {
            dim,
            frames: vec!["world", "base", "link1", "link2", "tool"],
            state: Mutex::new(JointConfig::zeros(dim)),
        }
    }

    /// 改写模拟的关节状态
    pub fn set_joint_state(&self, q: JointConfig) {
        *self.state.lock().unwrap() = q;
    }
}

impl WorldModel for MockWorld {
    fn joint_dim(&self) -> usize {
        self.dim
    }

    fn get_joint_state(&self) -> JointConfig {
        self.state.lock().unwrap().clone()
    }

    fn frame_ids(&self, names: &[&str]) -> Result<Vec<FrameId>, CtrlError> {
        names
            .iter()
            .map(|n| {
                self.frames
                    .iter()
                    .position(|f| f == n)
                    .map(|i| FrameId(i as u32))
                    .ok_or(CtrlError::UnknownFrame {
                        name: (*n).to_string(),
                    })
            })
            .collect()
    }

    fn all_frames(&self) -> Vec<FrameId> {
        (0..self.frames.len() as u32).map(FrameId).collect()
    }

    fn frame_name(&self, id: FrameId) -> Option<String> {
        self.frames.get(id.index()).map(|s| s.to_string())
    }
}

/// 线性特征：`y = A q + b`
///
/// 雅可比恒为 `A`，足以覆盖等式/不等式/平方和三种约束路径。
pub struct LinearFeature {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub tag: &'static str,
}

impl LinearFeature {
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Self {
        LinearFeature {
            a,
            b,
            tag: "linear",
        }
    }

    /// 单关节的标量恒等特征
    pub fn identity_1d() -> Self {
        LinearFeature::new(DMatrix::identity(1, 1), DVector::zeros(1))
    }
}

impl Feature for LinearFeature {
    fn eval(&self, ctx: &EvalContext<'_>) -> FeatureEval {
        FeatureEval {
            y: &self.a * ctx.window.current() + &self.b,
            jacobian: self.a.clone(),
        }
    }

    fn dim(&self) -> usize {
        self.a.nrows()
    }

    fn short_tag(&self, _world: &dyn WorldModel) -> String {
        self.tag.to_string()
    }
}

/// 参考下降求解器（阻尼 Gauss-Newton）
///
/// 尊重求解配置的全部约定：
/// - 残差/梯度进入容差即停
/// - 迭代数不超过 `max_iterations`
/// - 单次迭代步长和整次求解的总位移都不超过 `max_step`
pub struct DescentSolver {
    pub damping: f64,
}

impl DescentSolver {
    pub fn new() -> Self {
        DescentSolver { damping: 1e-6 }
    }
}

impl Optimizer for DescentSolver {
    fn minimize(
        &mut self,
        problem: &OptimizationProblem<'_>,
        options: &SolveOptions,
    ) -> (JointConfig, SolveReport) {
        let q0 = problem.window().current().clone();
        let n = q0.len();
        let mut q = q0.clone();
        let mut iterations = 0;
        let mut converged = false;

        for _ in 0..options.max_iterations {
            iterations += 1;

            // 1. 组装 JᵀJ / Jᵀr（ineq 只计违反的分量）
            let blocks = problem.eval_at(&q);
            let mut jtj = DMatrix::<f64>::zeros(n, n);
            let mut jtr = DVector::<f64>::zeros(n);
            let mut r_inf: f64 = 0.0;
            for block in &blocks {
                for i in 0..block.r.len() {
                    let ri = block.r[i];
                    if block.kind == ObjectiveKind::Ineq && ri <= 0.0 {
                        continue;
                    }
                    let ji = block.jacobian.row(i);
                    jtr += ji.transpose() * ri;
                    jtj += ji.transpose() * ji;
                    r_inf = r_inf.max(ri.abs());
                }
            }

            // 2. 停止判定
            let g_inf = jtr.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            if r_inf <= options.stop_tolerance || g_inf <= options.stop_g_tolerance {
                converged = true;
                break;
            }

            // 3. (JᵀJ + λI) δ = -Jᵀr
            let h = &jtj + DMatrix::identity(n, n) * self.damping;
            let delta = match h.lu().solve(&(-&jtr)) {
                Some(d) => d,
                None => -&jtr,
            };

            // 4. 单次迭代步长界
            let mut step = delta;
            let step_norm = step.norm();
            if step_norm > options.max_step {
                step *= options.max_step / step_norm;
            }
            q += step;

            // 5. 总位移界：一次求解不产生超过 max_step 的配置跳变
            let total = &q - &q0;
            let total_norm = total.norm();
            if total_norm > options.max_step {
                q = &q0 + total * (options.max_step / total_norm);
            }
        }

        let report = report_at(problem, &q, iterations, converged);
        (q, report)
    }
}

/// 在最终配置处汇总报告
fn report_at(
    problem: &OptimizationProblem<'_>,
    q: &JointConfig,
    iterations: u32,
    converged: bool,
) -> SolveReport {
    let mut eq: f64 = 0.0;
    let mut ineq: f64 = 0.0;
    for block in problem.eval_at(q) {
        match block.kind {
            ObjectiveKind::Eq => {
                eq = eq.max(block.r.iter().fold(0.0_f64, |m, v| m.max(v.abs())));
            }
            ObjectiveKind::Ineq => {
                ineq = ineq.max(block.r.iter().fold(0.0_f64, |m, v| m.max(*v)));
            }
            ObjectiveKind::Sos => {}
        }
    }
    SolveReport {
        sos: problem.sos_at(q),
        eq,
        ineq,
        iterations,
        converged,
    }
}

/// 收集下发命令的模拟执行器
#[derive(Default)]
pub struct CollectSink {
    pub commands: Vec<JointConfig>,
    pub fail_after: Option<usize>,
}

impl reflex_control::runner::CommandSink for CollectSink {
    fn command(&mut self, q: &JointConfig) -> Result<(), CtrlError> {
        if let Some(limit) = self.fail_after
            && self.commands.len() >= limit
        {
            return Err(CtrlError::CommandFailed("mock sink rejected".to_string()));
        }
        self.commands.push(q.clone());
        Ok(())
    }
}
