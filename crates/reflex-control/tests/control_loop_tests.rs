//! 控制循环集成测试
//!
//! 用模拟世界模型和参考下降求解器把整个 update/solve 节拍
//! 端到端跑起来。

mod common;

use std::sync::Arc;

use common::{CollectSink, DescentSolver, LinearFeature, MockWorld};
use nalgebra::{DMatrix, DVector};
use reflex_control::prelude::*;

fn q1(v: f64) -> JointConfig {
    JointConfig::from_vec(vec![v])
}

/// 单关节、单等式目标（固定目标值）的标准测试循环
fn one_dof_loop(target: f64, tau: f64, k_order: usize) -> (ControlLoop, CtrlHandle) {
    let world = Arc::new(MockWorld::new(1));
    let mut ctrl = ControlLoop::new(world, Box::new(DescentSolver::new()), tau, k_order).unwrap();
    let handle = ctrl
        .add_objective(
            ObjectiveSpec::new(Arc::new(LinearFeature::identity_1d()), ObjectiveKind::Eq)
                .with_fixed_target(q1(target)),
        )
        .unwrap();
    (ctrl, handle)
}

#[test]
fn test_policy_free_status_event_fires_exactly_once() {
    let (mut ctrl, handle) = one_dof_loop(0.0, 0.01, 0);
    let (hook, rx) = ChannelStatusHook::new();
    ctrl.add_status_callback(Arc::new(hook));

    ctrl.update(&q1(0.0)).unwrap();
    assert_eq!(handle.read().status(), ActStatus::Running);

    // 首次活跃 tick：恰好一个 init -> running 事件
    let event = rx.try_recv().unwrap();
    assert_eq!(event.from, ActStatus::Init);
    assert_eq!(event.to, ActStatus::Running);
    assert_eq!(event.tick, 1);

    // 之后幂等：不再有事件
    for _ in 0..5 {
        ctrl.update(&q1(0.1)).unwrap();
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(handle.read().status(), ActStatus::Running);
}

#[test]
fn test_inactive_objective_equals_removed_objective() {
    // 两个配置相同的循环：一个停用第二个目标，一个干脆移除它
    let build = || {
        let world = Arc::new(MockWorld::new(1));
        let mut ctrl =
            ControlLoop::new(world, Box::new(DescentSolver::new()), 0.01, 0).unwrap();
        let keep = ctrl
            .add_objective(
                ObjectiveSpec::new(Arc::new(LinearFeature::identity_1d()), ObjectiveKind::Eq)
                    .with_fixed_target(q1(1.0)),
            )
            .unwrap();
        let extra = ctrl
            .add_objective(
                ObjectiveSpec::new(Arc::new(LinearFeature::identity_1d()), ObjectiveKind::Sos)
                    .with_fixed_target(q1(-2.0)),
            )
            .unwrap();
        (ctrl, keep, extra)
    };

    let (mut deactivated, _, extra_a) = build();
    extra_a.write().set_active(false);

    let (mut removed, _, extra_b) = build();
    removed.del_objectives(&[extra_b]);

    deactivated.update(&q1(0.0)).unwrap();
    removed.update(&q1(0.0)).unwrap();

    let qa = deactivated.solve().unwrap();
    let qb = removed.solve().unwrap();
    // 不活跃的目标对结果零影响（完全排除，不是零权重）
    assert_eq!(qa, qb);
}

#[test]
fn test_all_selector_binds_world_frame_list() {
    let world = Arc::new(MockWorld::new(2));
    let mut ctrl =
        ControlLoop::new(world.clone(), Box::new(DescentSolver::new()), 0.01, 0).unwrap();

    let feat = Arc::new(LinearFeature::new(DMatrix::identity(2, 2), DVector::zeros(2)));
    let h = ctrl
        .add_objective(ObjectiveSpec::new(feat, ObjectiveKind::Sos))
        .unwrap();

    assert_eq!(h.read().frames(), world.all_frames().as_slice());
}

/// 端到端收敛：残差单调不增，单拍位移不超过步长界，
/// 有限拍数内收敛到 1e-4 以下。
#[test]
fn test_fixed_target_convergence_respects_step_bound() {
    let (mut ctrl, _) = one_dof_loop(1.0, 0.01, 0);
    let max_step = ctrl.solve_options().max_step;

    let mut q = q1(0.0);
    let mut last_residual = f64::INFINITY;
    let mut converged_at = None;

    for tick in 0..50 {
        ctrl.update(&q).unwrap();
        let next = ctrl.solve().unwrap();

        // 单拍位移不超过步长界
        let step = (&next - &q).norm();
        assert!(
            step <= max_step + 1e-9,
            "tick {tick}: step {step} exceeds bound {max_step}"
        );

        // 残差单调不增
        let residual = (next[0] - 1.0).abs();
        assert!(
            residual <= last_residual + 1e-12,
            "tick {tick}: residual increased {last_residual} -> {residual}"
        );
        last_residual = residual;

        q = next;
        if residual < 1e-4 {
            converged_at = Some(tick);
            break;
        }
    }

    let tick = converged_at.expect("did not converge within 50 ticks");
    // 距离 1.0、步长 0.1：至少需要 10 拍
    assert!(tick >= 9, "converged suspiciously fast at tick {tick}");
}

#[test]
fn test_moving_target_reaches_convergence() {
    let world = Arc::new(MockWorld::new(1));
    let mut ctrl = ControlLoop::new(world, Box::new(DescentSolver::new()), 0.01, 0).unwrap();
    let policy = ConstVelTarget::new(q1(0.3)).with_speed(1.0).with_precision(1e-3);
    let handle = ctrl
        .add_objective(
            ObjectiveSpec::new(Arc::new(LinearFeature::identity_1d()), ObjectiveKind::Eq)
                .with_moving_target(policy, q1(0.0))
                .with_name("follow"),
        )
        .unwrap();
    let (hook, rx) = ChannelStatusHook::new();
    ctrl.add_status_callback(Arc::new(hook));

    let mut q = q1(0.0);
    for _ in 0..60 {
        ctrl.update(&q).unwrap();
        q = ctrl.solve().unwrap();
    }

    assert_eq!(handle.read().status(), ActStatus::Converged);
    assert!((q[0] - 0.3).abs() < 1e-3);

    let events: Vec<StatusEvent> = rx.try_iter().collect();
    assert_eq!(events.first().map(|e| e.to), Some(ActStatus::Running));
    assert_eq!(events.last().map(|e| e.to), Some(ActStatus::Converged));
    assert!(events.iter().all(|e| e.objective == "follow"));
}

#[test]
fn test_degenerate_flag_clears_as_loop_converges() {
    // 目标离当前配置 1.0：第一拍后残差 0.9² >> 0.1，判定退化
    let (mut ctrl, _) = one_dof_loop(1.0, 0.01, 0);

    let mut q = q1(0.0);
    ctrl.update(&q).unwrap();
    q = ctrl.solve().unwrap();
    assert!(ctrl.last_solve_degenerate());

    // 跟到目标附近后标志自行清除
    for _ in 0..20 {
        ctrl.update(&q).unwrap();
        q = ctrl.solve().unwrap();
    }
    assert!(!ctrl.last_solve_degenerate());
    assert!(ctrl.last_report().unwrap().sos < 1e-6);
}

#[test]
fn test_velocity_damping_shrinks_first_step() {
    let (mut plain, _) = one_dof_loop(1.0, 0.01, 1);
    let (mut damped, _) = one_dof_loop(1.0, 0.01, 1);
    damped.add_q_control_objective(1, 0.5).unwrap();

    plain.update(&q1(0.0)).unwrap();
    damped.update(&q1(0.0)).unwrap();

    let q_plain = plain.solve().unwrap();
    let q_damped = damped.solve().unwrap();
    assert!(
        q_damped[0] < q_plain[0],
        "damped step {} should be smaller than plain step {}",
        q_damped[0],
        q_plain[0]
    );
    assert!(q_damped[0] > 0.0);
}

#[test]
fn test_set_handle_shared_with_loop_controls_participation() {
    let world = Arc::new(MockWorld::new(1));
    let mut ctrl = ControlLoop::new(world, Box::new(DescentSolver::new()), 0.01, 0).unwrap();

    // 行为用集合编写，再整批接入循环
    let mut behavior = ObjectiveSet::new("pull");
    let h = behavior.add_objective(Arc::new(LinearFeature::identity_1d()), ObjectiveKind::Eq);
    h.write().set_target(Target::Fixed(q1(1.0))).unwrap();
    ctrl.add_objectives(behavior.objectives()).unwrap();

    ctrl.update(&q1(0.0)).unwrap();
    let q_active = ctrl.solve().unwrap();
    assert!(q_active[0] > 0.0);

    // 通过集合里的同一句柄停用，循环立即看到
    h.write().set_active(false);
    ctrl.update(&q1(0.0)).unwrap();
    let q_inactive = ctrl.solve().unwrap();
    assert_eq!(q_inactive[0], 0.0);
}

#[test]
fn test_runner_drives_fixed_number_of_ticks() {
    let world = Arc::new(MockWorld::new(1));
    let mut ctrl = ControlLoop::new(world, Box::new(DescentSolver::new()), 0.001, 0).unwrap();
    ctrl.add_objective(
        ObjectiveSpec::new(Arc::new(LinearFeature::identity_1d()), ObjectiveKind::Eq)
            .with_fixed_target(q1(0.05)),
    )
    .unwrap();

    let mut sink = CollectSink::default();
    let config = RunConfig {
        max_ticks: Some(5),
        warn_overrun: false,
    };
    run_loop(&mut ctrl, &mut sink, config).unwrap();

    assert_eq!(sink.commands.len(), 5);
    assert_eq!(ctrl.tick(), 5);
}

#[test]
fn test_runner_propagates_sink_failure() {
    let world = Arc::new(MockWorld::new(1));
    let mut ctrl = ControlLoop::new(world, Box::new(DescentSolver::new()), 0.001, 0).unwrap();

    let mut sink = CollectSink {
        fail_after: Some(2),
        ..Default::default()
    };
    let config = RunConfig {
        max_ticks: Some(10),
        warn_overrun: false,
    };
    let err = run_loop(&mut ctrl, &mut sink, config).unwrap_err();
    assert!(matches!(err, CtrlError::CommandFailed(_)));
    assert_eq!(sink.commands.len(), 2);
}
