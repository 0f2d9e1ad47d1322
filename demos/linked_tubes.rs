//! Two analytical tubes chained by a teleporting sensor, with a point
//! injector upstream and a counting sensor downstream. Sensor logs and
//! particle traces land in ./results-linked-tubes.
//!
//! Run with: cargo run --example linked_tubes

use molcom_rs::prelude::*;
use nalgebra::Vector3;

fn main() -> Result<()> {
    env_logger::init();

    let radius = 0.00075;
    let tube_length = 0.09;

    let mut kernel = SimulationKernel::new(KernelConfig {
        seed: 42,
        sim_time_limit: 5.0,
        base_delta_time: 0.005,
        results_dir: "results-linked-tubes".into(),
        ..Default::default()
    });

    kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
        name: "tube_a".into(),
        radius,
        length: tube_length,
        outlet_zone: 0.005,
        flow_rate_mlpmin: 5.0,
        ..Default::default()
    })));
    kernel.attach_object(Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
        name: "tube_b".into(),
        translation: Vector3::new(0.0, 0.0, tube_length),
        radius,
        length: tube_length,
        outlet_zone: 0.005,
        flow_rate_mlpmin: 5.0,
        ..Default::default()
    })));

    kernel.attach_sensor(Box::new(TeleportingSensor::new(TeleportingSensorConfig {
        name: "junction".into(),
        source_object: "tube_a".into(),
        target_object: "tube_b".into(),
        ..Default::default()
    })));
    kernel.attach_sensor(Box::new(CountingSensor::new(CountingSensorConfig {
        name: "receiver".into(),
        shape: Shape::Cylinder,
        translation: Vector3::new(0.0, 0.0, 1.6 * tube_length),
        scale: Vector3::new(radius * 4.0, radius * 4.0, 0.01),
        ..Default::default()
    })));
    kernel.attach_sensor(Box::new(DestructingSensor::new(DestructingSensorConfig {
        name: "drain".into(),
        shape: Shape::Cylinder,
        translation: Vector3::new(0.0, 0.0, 1.95 * tube_length),
        scale: Vector3::new(radius * 4.0, radius * 4.0, 0.01),
        ..Default::default()
    })));

    kernel.attach_injector(Injector::new(InjectorConfig {
        name: "transmitter".into(),
        shape: Shape::Point,
        translation: Vector3::zeros(),
        attached_object: "tube_a".into(),
        injection_amount: 5,
        ..Default::default()
    })?);

    kernel.attach_trace_writer(TraceWriter::new(TraceConfig {
        folder: "positions".into(),
        write_interval: 20,
    }));

    kernel.run()?;

    println!(
        "simulated {} base steps, {} molecules still in the channel",
        kernel.clock().elapsed_base_steps,
        kernel.molecules().len()
    );
    println!("sensor logs: results-linked-tubes/sensor_data/");
    Ok(())
}
