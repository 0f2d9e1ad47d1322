//! Y-junction mixing two inlet streams into one outlet tube.
//!
//! The meshed geometry joins a background inlet and an injection inlet at a
//! configurable angle; the case is parameterized by both rates, so changing
//! either inlet swaps the loaded field. Downstream objects see the sum of
//! the two rates.

use log::warn;
use nalgebra::Vector3;

use crate::error::{Result, SimulationError};
use crate::fields::{FieldKey, FieldStore, Interpolation, VectorFieldManager};
use crate::geometry::{Geometry, Shape, Transformation};
use crate::kernel::InitStage;
use crate::scene::object::{
    resolve_flow, FlowObject, ObjectId, ObjectInitContext, OutOfFieldPolicy, OutletRateChange,
};

/// Construction parameters for a [`YPiece`].
#[derive(Debug, Clone)]
pub struct YPieceConfig {
    pub name: String,
    pub translation: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: Vector3<f64>,
    /// Radius of the outlet tube in m.
    pub radius: f64,
    /// Length of the outlet tube in m.
    pub outlet_length: f64,
    /// Length of the outlet teleport zone in m.
    pub outlet_zone: f64,
    /// Background flow rate in ml/min.
    pub flow_rate_background_mlpmin: f64,
    /// Injection flow rate in ml/min.
    pub flow_rate_injection_mlpmin: f64,
    pub mesh_resolution: u32,
    pub variant: String,
    pub out_of_field_policy: OutOfFieldPolicy,
}

impl Default for YPieceConfig {
    fn default() -> Self {
        Self {
            name: "y_piece".into(),
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            radius: 0.00075,
            outlet_length: 0.04,
            outlet_zone: 0.005,
            flow_rate_background_mlpmin: 5.0,
            flow_rate_injection_mlpmin: 0.0,
            mesh_resolution: 11,
            variant: String::new(),
            out_of_field_policy: OutOfFieldPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct YPiece {
    config: YPieceConfig,
    object_id: ObjectId,
    transformation: Transformation,
    manager: Option<VectorFieldManager>,
    interpolation: Interpolation,
    rate_background: f64,
    rate_injection: f64,
    inlets: Vec<String>,
    outlets: Vec<String>,
}

impl YPiece {
    pub fn new(config: YPieceConfig) -> Self {
        let transformation =
            Transformation::new(config.translation, config.rotation, config.scale);
        let rate_background = config.flow_rate_background_mlpmin;
        let rate_injection = config.flow_rate_injection_mlpmin;
        Self {
            config,
            object_id: usize::MAX,
            transformation,
            manager: None,
            interpolation: Interpolation::default(),
            rate_background,
            rate_injection,
            inlets: vec!["background".to_string(), "injection".to_string()],
            outlets: vec!["outlet".to_string()],
        }
    }

    fn total_rate(&self) -> f64 {
        self.rate_background + self.rate_injection
    }

    fn field_key(&self) -> FieldKey {
        FieldKey::y_piece(
            self.config.radius,
            self.rate_background,
            self.rate_injection,
            self.config.outlet_length,
            self.config.mesh_resolution,
            &self.config.variant,
        )
    }

    fn load_field(&mut self, store: &mut FieldStore) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let key = self.field_key();
        let field = store.load(&key)?;
        if let Some(previous) = &self.manager {
            if previous.cell_count() != field.len() {
                return Err(SimulationError::GeometryMismatch {
                    key: key.to_string(),
                    reason: format!(
                        "reloaded mesh has {} cells, previous had {}",
                        field.len(),
                        previous.cell_count()
                    ),
                });
            }
        }
        self.manager = Some(VectorFieldManager::new(field, self.transformation.clone()));
        Ok(())
    }
}

impl FlowObject for YPiece {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn object_id(&self) -> ObjectId {
        self.object_id
    }

    fn assign_id(&mut self, id: ObjectId) {
        self.object_id = id;
    }

    fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    fn is_active(&self) -> bool {
        self.total_rate().abs() > 1e-20
    }

    fn inlets(&self) -> &[String] {
        &self.inlets
    }

    fn outlets(&self) -> &[String] {
        &self.outlets
    }

    fn initialize(&mut self, stage: InitStage, ctx: &mut ObjectInitContext<'_>) -> Result<()> {
        match stage {
            InitStage::CheckArguments => {
                self.interpolation = ctx.interpolation;
                let scaling = self.transformation.scaling();
                if scaling.iter().any(|&s| !(0.999..=1.001).contains(&s)) {
                    warn!(
                        "y-piece \"{}\" is scaled by {:?}; the mesh already \
                         has an inherent scale from the flow computation",
                        self.config.name, scaling
                    );
                }
            }
            InitStage::CreateDataStructures => {
                self.load_field(ctx.store)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn flow_at(&self, position_global: &Vector3<f64>, _sim_time: f64) -> Vector3<f64> {
        if !self.is_active() {
            return Vector3::zeros();
        }
        resolve_flow(
            self.manager.as_ref(),
            position_global,
            self.interpolation,
            self.config.out_of_field_policy,
        )
    }

    fn field_manager(&self) -> Option<&VectorFieldManager> {
        if !self.is_active() {
            return None;
        }
        self.manager.as_ref()
    }

    fn bounds(&self) -> Option<(Geometry, Transformation)> {
        // The junction's own arms are short; the outlet tube dominates.
        // A cube over the outlet tube length doubles as a conservative
        // bounding volume for the whole piece.
        let side = (self.config.outlet_length).max(self.config.radius * 4.0);
        let local = Transformation::new(
            Vector3::new(0.0, 0.0, self.config.outlet_length / 2.0),
            Vector3::zeros(),
            Vector3::new(side, side, self.config.outlet_length),
        );
        self.transformation
            .then_after(&local)
            .ok()
            .map(|t| (Geometry::new(Shape::Cube), t))
    }

    fn outlet_area(&self, outlet: &str) -> Result<(Geometry, Transformation)> {
        if outlet != "outlet" {
            return Err(SimulationError::Configuration(format!(
                "y-piece \"{}\" has no outlet named \"{outlet}\"",
                self.config.name
            )));
        }
        let local = Transformation::new(
            Vector3::new(
                0.0,
                0.0,
                self.config.outlet_length - self.config.outlet_zone / 2.0,
            ),
            Vector3::zeros(),
            Vector3::new(
                self.config.radius * 2.0,
                self.config.radius * 2.0,
                self.config.outlet_zone,
            ),
        );
        Ok((
            Geometry::new(Shape::Cylinder),
            self.transformation.then_after(&local)?,
        ))
    }

    fn outlet_frame(&self, outlet: &str) -> Result<Transformation> {
        if outlet != "outlet" {
            return Err(SimulationError::Configuration(format!(
                "y-piece \"{}\" has no outlet named \"{outlet}\"",
                self.config.name
            )));
        }
        self.transformation.then_after(&Transformation::new(
            Vector3::new(0.0, 0.0, self.config.outlet_length),
            Vector3::zeros(),
            Vector3::new(1.0, 1.0, 1.0),
        ))
    }

    fn inlet_frame(&self, inlet: &str) -> Result<Transformation> {
        if !self.inlets.iter().any(|name| name == inlet) {
            return Err(SimulationError::Configuration(format!(
                "y-piece \"{}\" has no inlet named \"{inlet}\"",
                self.config.name
            )));
        }
        // Both inlet arms meet at the junction origin; incoming molecules
        // continue along the outlet axis from there.
        Ok(self.transformation.clone())
    }

    fn set_inlet_flow_rate(
        &mut self,
        store: &mut FieldStore,
        inlet: &str,
        rate_mlpmin: f64,
    ) -> Result<Vec<OutletRateChange>> {
        match inlet {
            "background" => self.rate_background = rate_mlpmin,
            "injection" => self.rate_injection = rate_mlpmin,
            other => {
                return Err(SimulationError::Configuration(format!(
                    "y-piece \"{}\" has no inlet named \"{other}\"",
                    self.config.name
                )))
            }
        }
        if self.is_active() {
            self.load_field(store)?;
        }
        Ok(vec![("outlet".to_string(), self.total_rate())])
    }

    fn prime_flow_system(&mut self, store: &mut FieldStore) -> Result<Vec<OutletRateChange>> {
        // One call suffices: both rate fields are already set from the
        // configuration, and loading the field once covers them both.
        self.set_inlet_flow_rate(store, "injection", self.config.flow_rate_injection_mlpmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write as _;
    use std::path::Path;

    fn idle_ypiece() -> YPiece {
        YPiece::new(YPieceConfig {
            flow_rate_background_mlpmin: 0.0,
            flow_rate_injection_mlpmin: 0.0,
            ..Default::default()
        })
    }

    /// A minimal case for the given inlet rates: two cells along the
    /// outlet axis with a uniform +z flow.
    fn write_case(cases_root: &Path, piece: &YPiece, flow_z: f64) {
        let key = piece.field_key();
        let dir = cases_root.join(&key.family).join(&key.case).join("1");
        fs::create_dir_all(&dir).unwrap();
        let mut c = fs::File::create(dir.join("C")).unwrap();
        writeln!(c, "2\n0 0 0.01\n0 0 0.03").unwrap();
        let mut u = fs::File::create(dir.join("U")).unwrap();
        writeln!(u, "2\n0 0 {flow_z}\n0 0 {flow_z}").unwrap();
    }

    #[test]
    fn idle_junction_reports_zero_flow_and_rate() {
        let mut piece = idle_ypiece();
        assert!(!piece.is_active());
        assert!(piece
            .flow_at(&Vector3::new(0.0, 0.0, 0.02), 0.0)
            .norm()
            .abs()
            < 1e-20);
        // Propagating a zero rate keeps it idle and skips field loading.
        let mut store = FieldStore::new(std::env::temp_dir());
        let changes = piece
            .set_inlet_flow_rate(&mut store, "background", 0.0)
            .unwrap();
        assert_eq!(changes, vec![("outlet".to_string(), 0.0)]);
    }

    #[test]
    fn outlet_rate_is_the_sum_of_both_inlets() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FieldStore::new(tmp.path());
        let mut piece = idle_ypiece();

        // Prepare the case matching bg=3, in=0 before raising the rate.
        piece.rate_background = 3.0;
        write_case(tmp.path(), &piece, 0.02);
        piece.rate_background = 0.0;

        let changes = piece
            .set_inlet_flow_rate(&mut store, "background", 3.0)
            .unwrap();
        assert_eq!(changes, vec![("outlet".to_string(), 3.0)]);
        assert!(piece.is_active());

        // Raising the injection rate needs the case for bg=3, in=2.
        piece.rate_injection = 2.0;
        write_case(tmp.path(), &piece, 0.05);
        piece.rate_injection = 0.0;

        let changes = piece
            .set_inlet_flow_rate(&mut store, "injection", 2.0)
            .unwrap();
        assert_eq!(changes, vec![("outlet".to_string(), 5.0)]);
        let flow = piece.flow_at(&Vector3::new(0.0, 0.0, 0.02), 0.0);
        assert!((flow.z - 0.05).abs() < 1e-9);
    }

    #[test]
    fn missing_case_for_a_rate_pair_is_a_geometry_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = FieldStore::new(tmp.path());
        let mut piece = idle_ypiece();
        assert!(matches!(
            piece.set_inlet_flow_rate(&mut store, "background", 7.0),
            Err(SimulationError::GeometryMismatch { .. })
        ));
    }

    #[test]
    fn unknown_inlets_are_rejected() {
        let mut piece = idle_ypiece();
        let mut store = FieldStore::new(std::env::temp_dir());
        assert!(piece
            .set_inlet_flow_rate(&mut store, "sideways", 1.0)
            .is_err());
        assert!(piece.inlet_frame("sideways").is_err());
        assert!(piece.inlet_frame("background").is_ok());
        assert!(piece.inlet_frame("injection").is_ok());
    }

    #[test]
    fn outlet_frame_sits_at_the_end_of_the_outlet_tube() {
        let piece = idle_ypiece();
        let frame = piece.outlet_frame("outlet").unwrap();
        let origin = frame.apply_to_point(&Vector3::zeros());
        assert!((origin - Vector3::new(0.0, 0.0, 0.04)).norm() < 1e-12);
    }
}
