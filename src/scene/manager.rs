//! The scene graph: object ownership, position resolution, and flow-rate
//! propagation along interconnections.

use std::collections::HashMap;

use log::debug;
use nalgebra::Vector3;

use crate::error::{Result, SimulationError};
use crate::fields::FieldStore;
use crate::geometry::Transformation;
use crate::kernel::{InitStage, NotificationStage, SimulationClock};
use crate::scene::object::{FlowObject, ObjectId, ObjectInitContext, OutletRateChange};

/// An interconnection endpoint: object id plus port name.
type Port = (ObjectId, String);

/// Owns all flow objects and the links between their outlets and inlets.
#[derive(Debug, Default)]
pub struct SceneManager {
    objects: Vec<Box<dyn FlowObject>>,
    names: HashMap<String, ObjectId>,
    /// Outlet port of one object -> inlet port of the downstream object.
    links: HashMap<Port, Port>,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object. Ids follow registration order, which also fixes
    /// the resolution order of [`SceneManager::locate`].
    pub fn add_object(&mut self, mut object: Box<dyn FlowObject>) -> ObjectId {
        let id = self.objects.len();
        object.assign_id(id);
        debug!("adding object \"{}\" as id {id}", object.name());
        self.names.insert(object.name().to_string(), id);
        self.objects.push(object);
        id
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, id: ObjectId) -> Option<&dyn FlowObject> {
        self.objects.get(id).map(|o| o.as_ref())
    }

    pub fn object_id_by_name(&self, name: &str) -> Result<ObjectId> {
        self.names.get(name).copied().ok_or_else(|| {
            SimulationError::Configuration(format!(
                "no object named \"{name}\" is attached to the scene"
            ))
        })
    }

    pub fn objects(&self) -> impl Iterator<Item = &dyn FlowObject> {
        self.objects.iter().map(|o| o.as_ref())
    }

    /// Reject duplicate component names; called during scene building.
    pub fn validate(&self) -> Result<()> {
        if self.names.len() != self.objects.len() {
            return Err(SimulationError::Configuration(
                "two scene objects share a component name".into(),
            ));
        }
        Ok(())
    }

    /// Run one initialization stage over all objects, in registration
    /// order, wrapping failures with the failing object's name.
    pub fn initialize_objects(
        &mut self,
        stage: InitStage,
        ctx: &mut ObjectInitContext<'_>,
    ) -> Result<()> {
        for object in &mut self.objects {
            object
                .initialize(stage, ctx)
                .map_err(|e| e.during_startup(stage, object.name()))?;
        }
        Ok(())
    }

    /// Register an interconnection from a source outlet to a target inlet.
    /// Registered by teleporting sensors during their linking stage.
    pub fn add_interconnection(
        &mut self,
        source: ObjectId,
        source_outlet: &str,
        target: ObjectId,
        target_inlet: &str,
    ) {
        debug!(
            "linking object {source} outlet \"{source_outlet}\" to object \
             {target} inlet \"{target_inlet}\""
        );
        self.links.insert(
            (source, source_outlet.to_string()),
            (target, target_inlet.to_string()),
        );
    }

    /// Flow velocity governing a molecule owned by `object_id` at a global
    /// position. NaN flow is rejected as a fatal field defect.
    pub fn flow_at(
        &self,
        object_id: ObjectId,
        position_global: &Vector3<f64>,
        sim_time: f64,
    ) -> Result<Vector3<f64>> {
        let object = self.objects.get(object_id).ok_or_else(|| {
            SimulationError::Configuration(format!("unknown object id {object_id}"))
        })?;
        let flow = object.flow_at(position_global, sim_time);
        if flow.iter().any(|v| v.is_nan()) {
            return Err(SimulationError::NumericalInstability(format!(
                "flow is NaN at position {position_global:?} in object \
                 \"{}\"",
                object.name()
            )));
        }
        Ok(flow)
    }

    /// Resolve a global position to the first active object whose bounding
    /// shape contains it, in registration order, together with the
    /// position in that object's bounding frame. Objects are expected not
    /// to overlap; the fixed order makes accidental overlap deterministic.
    pub fn locate(&self, position_global: &Vector3<f64>) -> Option<(ObjectId, Vector3<f64>)> {
        for object in &self.objects {
            if !object.is_active() {
                continue;
            }
            let Some((geometry, transformation)) = object.bounds() else {
                continue;
            };
            let local = transformation.apply_inverse_to_point(position_global);
            if geometry.contains(&local) {
                return Some((object.object_id(), local));
            }
        }
        None
    }

    /// Nearest mesh cell of an object to a global position.
    pub fn closest_cell(&self, object_id: ObjectId, position_global: &Vector3<f64>) -> Option<usize> {
        self.objects
            .get(object_id)
            .and_then(|o| o.closest_cell(position_global))
    }

    /// Outlet frame of a named object port.
    pub fn outlet_frame(&self, object_id: ObjectId, outlet: &str) -> Result<Transformation> {
        self.require_object(object_id)?.outlet_frame(outlet)
    }

    pub fn inlet_frame(&self, object_id: ObjectId, inlet: &str) -> Result<Transformation> {
        self.require_object(object_id)?.inlet_frame(inlet)
    }

    fn require_object(&self, object_id: ObjectId) -> Result<&dyn FlowObject> {
        self.objects
            .get(object_id)
            .map(|o| o.as_ref())
            .ok_or_else(|| {
                SimulationError::Configuration(format!("unknown object id {object_id}"))
            })
    }

    /// Propagate a changed outlet flow rate through the interconnection
    /// graph. Worklist-based: each reached object updates itself and
    /// reports its own outlet changes, which are queued in turn. Reaching
    /// an outlet without a link is the expected end of a chain.
    pub fn propagate_flow_rate(
        &mut self,
        store: &mut FieldStore,
        source: ObjectId,
        outlet: &str,
        rate_mlpmin: f64,
    ) -> Result<()> {
        let mut queue: Vec<(ObjectId, String, f64)> =
            vec![(source, outlet.to_string(), rate_mlpmin)];
        // An upper bound on propagation hops; a cycle in the link graph
        // would otherwise spin forever with pathological configurations.
        let mut budget = self.objects.len() * self.links.len().max(1) * 4 + 16;
        while let Some((object_id, outlet_name, rate)) = queue.pop() {
            if budget == 0 {
                return Err(SimulationError::Configuration(
                    "flow-rate propagation does not terminate; the \
                     interconnection graph has a cycle"
                        .into(),
                ));
            }
            budget -= 1;
            let Some((target_id, inlet_name)) =
                self.links.get(&(object_id, outlet_name)).cloned()
            else {
                continue;
            };
            debug!(
                "propagating rate {rate} ml/min into object {target_id} \
                 inlet \"{inlet_name}\""
            );
            let changes = self.objects[target_id].set_inlet_flow_rate(store, &inlet_name, rate)?;
            for (downstream_outlet, downstream_rate) in changes {
                queue.push((target_id, downstream_outlet, downstream_rate));
            }
        }
        Ok(())
    }

    /// Prime every object's flow state from its configured rates, then
    /// propagate the resulting outlet rates downstream. Runs during the
    /// flow-system setup stage.
    pub fn set_up_flow_system(&mut self, store: &mut FieldStore) -> Result<()> {
        for id in 0..self.objects.len() {
            let changes = self.objects[id]
                .prime_flow_system(store)
                .map_err(|e| e.during_startup(InitStage::SetUpFlowSystem, self.objects[id].name()))?;
            for (outlet, rate) in changes {
                self.propagate_flow_rate(store, id, &outlet, rate)?;
            }
        }
        Ok(())
    }

    /// Per-base-step hook over all objects; collects and applies any
    /// actuation-driven rate changes.
    pub fn notify_objects(
        &mut self,
        store: &mut FieldStore,
        clock: &SimulationClock,
        stage: NotificationStage,
    ) -> Result<()> {
        let mut pending: Vec<(ObjectId, String, f64)> = Vec::new();
        for object in &mut self.objects {
            for (outlet, rate) in object.on_time_step(clock, stage) {
                pending.push((object.object_id(), outlet, rate));
            }
        }
        for (id, outlet, rate) in pending {
            self.propagate_flow_rate(store, id, &outlet, rate)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::tube_analytical::{AnalyticalTube, AnalyticalTubeConfig};
    use crate::scene::pump::{Pump, PumpConfig};

    fn analytical(name: &str, z_offset: f64, rate: f64) -> Box<AnalyticalTube> {
        Box::new(AnalyticalTube::new(AnalyticalTubeConfig {
            name: name.into(),
            translation: Vector3::new(0.0, 0.0, z_offset),
            radius: 0.001,
            length: 0.1,
            flow_rate_mlpmin: rate,
            ..Default::default()
        }))
    }

    fn two_tube_scene() -> SceneManager {
        let mut scene = SceneManager::new();
        scene.add_object(analytical("a", 0.0, 5.0));
        scene.add_object(analytical("b", 0.1, 5.0));
        scene.add_interconnection(0, "outlet", 1, "inlet");
        scene
    }

    #[test]
    fn names_resolve_to_registration_ids() {
        let scene = two_tube_scene();
        assert_eq!(scene.object_id_by_name("a").unwrap(), 0);
        assert_eq!(scene.object_id_by_name("b").unwrap(), 1);
        assert!(scene.object_id_by_name("c").is_err());
    }

    #[test]
    fn locate_returns_the_first_containing_object() {
        let scene = two_tube_scene();
        let (id, _) = scene.locate(&Vector3::new(0.0, 0.0, 0.05)).unwrap();
        assert_eq!(id, 0);
        let (id, _) = scene.locate(&Vector3::new(0.0, 0.0, 0.15)).unwrap();
        assert_eq!(id, 1);
        assert!(scene.locate(&Vector3::new(0.0, 0.0, 0.5)).is_none());
        assert!(scene.locate(&Vector3::new(0.05, 0.0, 0.05)).is_none());
    }

    #[test]
    fn rate_changes_travel_down_the_chain() {
        let mut scene = two_tube_scene();
        let mut store = FieldStore::new(std::env::temp_dir());
        scene
            .propagate_flow_rate(&mut store, 0, "outlet", 2.5)
            .unwrap();
        // Object b picked up the new rate; a (the source) is untouched.
        let b_flow = scene
            .flow_at(1, &Vector3::new(0.0, 0.0, 0.15), 0.0)
            .unwrap();
        let expected_mean = mlpmin_to_m3ps_mean(2.5, 0.001);
        assert!((b_flow.z - expected_mean * 2.0).abs() < 1e-9);
    }

    fn mlpmin_to_m3ps_mean(rate: f64, radius: f64) -> f64 {
        rate * 1e-6 / 60.0 / (std::f64::consts::PI * radius * radius)
    }

    #[test]
    fn chain_ends_are_not_an_error() {
        let mut scene = two_tube_scene();
        let mut store = FieldStore::new(std::env::temp_dir());
        // Object b's outlet has no link.
        assert!(scene
            .propagate_flow_rate(&mut store, 1, "outlet", 1.0)
            .is_ok());
    }

    #[test]
    fn cyclic_links_are_detected() {
        let mut scene = two_tube_scene();
        scene.add_interconnection(1, "outlet", 0, "inlet");
        let mut store = FieldStore::new(std::env::temp_dir());
        assert!(matches!(
            scene.propagate_flow_rate(&mut store, 0, "outlet", 1.0),
            Err(SimulationError::Configuration(_))
        ));
    }

    #[test]
    fn pump_actuation_drives_downstream_rates() {
        let mut scene = SceneManager::new();
        scene.add_object(Box::new(Pump::new(PumpConfig {
            name: "pump".into(),
            injection_rate_mlpmin: 10.0,
            injection_volume_l: 0.001,
            schedule: vec![0.0],
        })));
        scene.add_object(analytical("tube", 0.0, 0.0));
        scene.add_interconnection(0, "outlet", 1, "inlet");

        let mut store = FieldStore::new(std::env::temp_dir());
        let mut clock = SimulationClock::new(0.1, 100.0);
        clock.sim_time = 0.0;
        scene
            .notify_objects(&mut store, &clock, NotificationStage::Actuation)
            .unwrap();
        // The tube is now running at the pump's injection rate.
        let flow = scene.flow_at(1, &Vector3::new(0.0, 0.0, 0.05), 0.0).unwrap();
        assert!(flow.z > 0.0);
    }

    #[test]
    fn nan_flow_is_rejected() {
        #[derive(Debug)]
        struct NanObject {
            id: ObjectId,
            ports: Vec<String>,
        }
        impl FlowObject for NanObject {
            fn name(&self) -> &str {
                "nan"
            }
            fn object_id(&self) -> ObjectId {
                self.id
            }
            fn assign_id(&mut self, id: ObjectId) {
                self.id = id;
            }
            fn transformation(&self) -> &Transformation {
                unimplemented!("not needed")
            }
            fn is_active(&self) -> bool {
                true
            }
            fn inlets(&self) -> &[String] {
                &self.ports
            }
            fn outlets(&self) -> &[String] {
                &self.ports
            }
            fn flow_at(&self, _p: &Vector3<f64>, _t: f64) -> Vector3<f64> {
                Vector3::new(f64::NAN, 0.0, 0.0)
            }
            fn field_manager(&self) -> Option<&crate::fields::VectorFieldManager> {
                None
            }
            fn bounds(&self) -> Option<(crate::geometry::Geometry, Transformation)> {
                None
            }
            fn outlet_area(&self, _o: &str) -> Result<(crate::geometry::Geometry, Transformation)> {
                unimplemented!("not needed")
            }
            fn outlet_frame(&self, _o: &str) -> Result<Transformation> {
                unimplemented!("not needed")
            }
            fn inlet_frame(&self, _i: &str) -> Result<Transformation> {
                unimplemented!("not needed")
            }
            fn set_inlet_flow_rate(
                &mut self,
                _s: &mut FieldStore,
                _i: &str,
                _r: f64,
            ) -> Result<Vec<OutletRateChange>> {
                Ok(Vec::new())
            }
            fn prime_flow_system(&mut self, _s: &mut FieldStore) -> Result<Vec<OutletRateChange>> {
                Ok(Vec::new())
            }
        }

        let mut scene = SceneManager::new();
        scene.add_object(Box::new(NanObject {
            id: 0,
            ports: Vec::new(),
        }));
        assert!(matches!(
            scene.flow_at(0, &Vector3::zeros(), 0.0),
            Err(SimulationError::NumericalInstability(_))
        ));
    }
}
