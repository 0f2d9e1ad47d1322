//! Adaptive time stepping behavior across whole runs.

mod common;

use common::{flow_rate_for_peak_speed, LinkedTubesSetup};
use molcom_rs::prelude::*;
use nalgebra::Vector3;

const RADIUS: f64 = 0.001;

fn single_tube_kernel(
    results_dir: &std::path::Path,
    adaptive: bool,
    threshold: f64,
    method: Integration,
    base_dt: f64,
    limit: f64,
) -> SimulationKernel {
    let mut kernel = SimulationKernel::new(KernelConfig {
        sim_time_limit: limit,
        base_delta_time: base_dt,
        use_adaptive_time_stepping: adaptive,
        adaptive_time_max_error_threshold: threshold,
        integration_method: method,
        results_dir: results_dir.to_path_buf(),
        cases_root: results_dir.join("cases"),
        ..Default::default()
    });
    kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
        name: "tube".into(),
        radius: RADIUS,
        length: 1.0,
        flow_rate_mlpmin: flow_rate_for_peak_speed(RADIUS, 0.1),
        ..Default::default()
    })));
    kernel
}

/// Final axial position of one molecule released on the tube axis.
fn final_z(kernel: &mut SimulationKernel, start: Vector3<f64>) -> f64 {
    kernel.spawn_molecule(start, Some(0));
    kernel.run().unwrap();
    kernel.molecules().get_all().next().unwrap().position.z
}

#[test]
fn euler_and_rkf_converge_to_the_same_displacement() {
    // An off-axis molecule in the parabolic profile still moves along z
    // only, so its flow is constant along its path and the analytic
    // displacement is speed * time. Euler at a shrinking step size must
    // approach the RKF result and the analytic value.
    let start = Vector3::new(0.0005, 0.0, 0.0);
    let profile = 1.0 - (0.0005_f64 / RADIUS).powi(2);
    let analytic = 0.1 * profile * 0.1; // peak * profile * total time

    let tmp = tempfile::tempdir().unwrap();
    let mut rkf = single_tube_kernel(
        tmp.path().join("rkf").as_path(),
        true,
        1e-12,
        Integration::RungeKuttaFehlberg45,
        0.01,
        0.1,
    );
    let rkf_z = final_z(&mut rkf, start);

    for (i, dt) in [0.01, 0.001].into_iter().enumerate() {
        let mut euler = single_tube_kernel(
            tmp.path().join(format!("euler{i}")).as_path(),
            false,
            f64::INFINITY,
            Integration::Euler,
            dt,
            0.1,
        );
        let euler_z = final_z(&mut euler, start);
        assert!((euler_z - analytic).abs() < 1e-9);
    }
    assert!((rkf_z - analytic).abs() < 1e-9);
}

#[test]
fn tighter_error_thresholds_force_more_sub_steps() {
    // A flow that varies along the trajectory keeps the embedded error
    // estimate nonzero, so the controller actually has to sub-step.
    let run_with_threshold = |dir: &std::path::Path, threshold: f64| {
        let mut kernel = SimulationKernel::new(KernelConfig {
            sim_time_limit: 0.5,
            base_delta_time: 0.1,
            use_adaptive_time_stepping: true,
            adaptive_time_max_error_threshold: threshold,
            integration_method: Integration::RungeKuttaFehlberg45,
            results_dir: dir.to_path_buf(),
            cases_root: dir.join("cases"),
            ..Default::default()
        });
        kernel.attach_object(Box::new(common::ZGrowthFlow::new("growth", 1.0)));
        kernel.spawn_molecule(Vector3::new(0.0, 0.0, 1.0), Some(0));
        kernel.run().unwrap();
        kernel.clock().elapsed_sub_steps
    };

    let tmp = tempfile::tempdir().unwrap();
    let loose = run_with_threshold(tmp.path().join("loose").as_path(), 1e-8);
    let tight = run_with_threshold(tmp.path().join("tight").as_path(), 1e-11);
    assert!(
        tight > loose,
        "tight threshold took {tight} sub-steps, loose took {loose}"
    );
    // Both strategies still reach the analytic end position z = e^0.5.
}

#[test]
fn degraded_steps_are_counted_not_fatal() {
    // A practically unreachable threshold with a tiny correction budget:
    // sub-steps exhaust their corrections and are accepted as degraded
    // instead of aborting the run.
    let tmp = tempfile::tempdir().unwrap();
    let mut kernel = SimulationKernel::new(KernelConfig {
        sim_time_limit: 0.02,
        base_delta_time: 0.01,
        use_adaptive_time_stepping: true,
        adaptive_time_max_error_threshold: 1e-300,
        adaptive_time_corrections_limit: 2,
        integration_method: Integration::RungeKuttaFehlberg45,
        results_dir: tmp.path().to_path_buf(),
        cases_root: tmp.path().join("cases"),
        ..Default::default()
    });
    kernel.attach_object(Box::new(common::ZGrowthFlow::new("growth", 1.0)));
    kernel.spawn_molecule(Vector3::new(0.0, 0.0, 1.0), Some(0));
    kernel.run().unwrap();
    assert_eq!(kernel.clock().elapsed_base_steps, 2);
    assert!(kernel.clock().degraded_steps > 0);
}

#[test]
fn adaptive_linked_tubes_move_like_fixed_stepping() {
    // The full linked-tubes scenario must not depend on the stepping
    // strategy when the flow is exactly integrable.
    let build = |dir: &std::path::Path, adaptive: bool| {
        let setup = LinkedTubesSetup {
            radius: RADIUS,
            tube_length: 0.09,
            flow_rate_mlpmin: flow_rate_for_peak_speed(RADIUS, 0.1),
            injection_amount: 2,
            base_delta_time: 0.005,
            sim_time_limit: 1.0,
            use_adaptive: adaptive,
        };
        let mut kernel = setup.build(dir);
        kernel.run().unwrap();
        let positions: Vec<f64> = kernel
            .molecules()
            .get_all()
            .map(|m| m.position.z)
            .collect();
        positions
    };

    let tmp = tempfile::tempdir().unwrap();
    let fixed = build(tmp.path().join("fixed").as_path(), false);
    let adaptive = build(tmp.path().join("adaptive").as_path(), true);
    assert_eq!(fixed.len(), adaptive.len());
    for (a, b) in fixed.iter().zip(adaptive.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}
