//! End-to-end scenario: two tubes chained via a teleporting sensor, a point
//! injector upstream, and a counting sensor downstream. The cumulative
//! count must match the analytically predicted arrival schedule.

mod common;

use common::{flow_rate_for_peak_speed, sum_log_column, LinkedTubesSetup};
use molcom_rs::output::SensorLog;
use molcom_rs::prelude::*;
use nalgebra::Vector3;

const RADIUS: f64 = 0.001;
const TUBE_LENGTH: f64 = 0.09;
const PEAK_SPEED: f64 = 0.1; // m/s on the tube axis
const BASE_DT: f64 = 0.005;
const STEPS: u64 = 400;
const INJECTION_AMOUNT: usize = 5;

/// Start of the counting zone along z, deliberately off the step grid so
/// no arrival lands exactly on the boundary.
const ZONE_START: f64 = 0.1601;
const ZONE_LENGTH: f64 = 0.02;

fn setup() -> LinkedTubesSetup {
    LinkedTubesSetup {
        radius: RADIUS,
        tube_length: TUBE_LENGTH,
        flow_rate_mlpmin: flow_rate_for_peak_speed(RADIUS, PEAK_SPEED),
        injection_amount: INJECTION_AMOUNT,
        base_delta_time: BASE_DT,
        sim_time_limit: STEPS as f64 * BASE_DT,
        use_adaptive: false,
    }
}

fn counting_sensor() -> CountingSensor {
    CountingSensor::new(CountingSensorConfig {
        name: "receiver".into(),
        shape: Shape::Cylinder,
        translation: Vector3::new(0.0, 0.0, ZONE_START + ZONE_LENGTH / 2.0),
        scale: Vector3::new(RADIUS * 4.0, RADIUS * 4.0, ZONE_LENGTH),
        ..Default::default()
    })
}

/// Number of base steps an on-axis molecule needs to first reach the
/// counting zone: displacement per step is PEAK_SPEED * BASE_DT.
fn steps_to_zone() -> u64 {
    (ZONE_START / (PEAK_SPEED * BASE_DT)).ceil() as u64
}

/// Analytic cumulative count: one injection batch is released at t = 0 and
/// after every base step. The batch released after step k reaches the zone
/// at step k + steps_to_zone; batches with an arrival step within the run
/// contribute their full size.
fn expected_cumulative_count(steps: u64) -> f64 {
    let n0 = steps_to_zone();
    if steps < n0 {
        return 0.0;
    }
    ((steps - n0 + 1) * INJECTION_AMOUNT as u64) as f64
}

#[test]
fn cumulative_count_matches_the_analytic_arrival_schedule() {
    let tmp = tempfile::tempdir().unwrap();
    let mut kernel = setup().build(tmp.path());
    kernel.attach_sensor(Box::new(counting_sensor()));
    kernel.run().unwrap();

    let log = SensorLog::file_path(tmp.path(), "sensor_data", "receiver");
    let counted = sum_log_column(&log);
    assert_eq!(
        counted,
        expected_cumulative_count(STEPS),
        "analytic schedule predicts {} arrivals",
        expected_cumulative_count(STEPS)
    );
}

#[test]
fn destructing_sensor_removes_molecules_after_the_receiver() {
    let tmp = tempfile::tempdir().unwrap();
    let mut kernel = setup().build(tmp.path());
    kernel.attach_sensor(Box::new(counting_sensor()));
    // Absorb molecules close to the end of the second tube, downstream of
    // the counting zone.
    kernel.attach_sensor(Box::new(DestructingSensor::new(DestructingSensorConfig {
        name: "drain".into(),
        shape: Shape::Cylinder,
        translation: Vector3::new(0.0, 0.0, 0.17760),
        scale: Vector3::new(RADIUS * 4.0, RADIUS * 4.0, 0.005),
        ..Default::default()
    })));
    kernel.run().unwrap();

    // Counting is unaffected: molecules are counted before they reach the
    // drain.
    let log = SensorLog::file_path(tmp.path(), "sensor_data", "receiver");
    assert_eq!(sum_log_column(&log), expected_cumulative_count(STEPS));

    // Every batch whose drain arrival lies within the run is gone. The
    // drain zone starts at z = 0.17510, i.e. 351 steps after release.
    let drain_steps = (0.17510_f64 / (PEAK_SPEED * BASE_DT)).ceil() as u64;
    let destroyed_batches = STEPS - drain_steps + 1;
    // One batch is released at t = 0 plus one after every completed step.
    let spawned_batches = STEPS + 1;
    let expected_alive =
        (spawned_batches - destroyed_batches) as usize * INJECTION_AMOUNT;
    assert_eq!(kernel.molecules().len(), expected_alive);
}

#[test]
fn disabled_receiver_stops_counting_mid_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut kernel = setup().build(tmp.path());
    kernel.attach_sensor(Box::new(counting_sensor()));

    // Let arrivals accumulate for a while, then switch the receiver off.
    let cutoff_step: u64 = 350;
    kernel.run_until(cutoff_step as f64 * BASE_DT).unwrap();
    kernel
        .sensor_mut("receiver")
        .unwrap()
        .zone_mut()
        .turn_off();
    kernel.run().unwrap();

    let log = SensorLog::file_path(tmp.path(), "sensor_data", "receiver");
    let counted = sum_log_column(&log);
    // Exactly the arrivals up to the cutoff are on record, although
    // molecules keep streaming through the zone afterwards.
    let expected = expected_cumulative_count(cutoff_step);
    assert!(expected > 0.0, "the cutoff must lie after the first arrival");
    assert_eq!(counted, expected);
}

#[test]
fn teleportation_keeps_molecule_spacing_continuous() {
    let tmp = tempfile::tempdir().unwrap();
    let mut kernel = setup().build(tmp.path());
    kernel.run().unwrap();

    // All molecules sit on the axis, spaced by one step's displacement.
    // A teleport-induced jump would show up as a gap or pile-up around the
    // junction at z = 0.09.
    let mut positions: Vec<f64> = kernel
        .molecules()
        .get_all()
        .map(|m| m.position.z)
        .filter(|&z| z > 0.07 && z < 0.11)
        .collect();
    positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
    positions.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

    let spacing = PEAK_SPEED * BASE_DT;
    for pair in positions.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            (gap - spacing).abs() < 1e-9,
            "uneven spacing {gap} around the junction (expected {spacing})"
        );
    }

    // Molecules past the junction belong to the second tube.
    for molecule in kernel.molecules().get_all() {
        if molecule.position.z > 0.095 {
            assert_eq!(molecule.object_id, Some(1));
        }
        if molecule.position.z < 0.08 {
            assert_eq!(molecule.object_id, Some(0));
        }
    }
}
