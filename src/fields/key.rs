//! Cache keys for flow-field datasets.
//!
//! A key identifies one geometry parameterization of a CFD case. It renders
//! to both the case directory name under the cases root and the file name of
//! the binary cache, so loading the same key twice always resolves to the
//! same data.

use std::fmt;

/// Identifies one parameterized CFD case.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldKey {
    /// Case family, i.e. the subdirectory of the cases root
    /// (`tube`, `y_connector`, ...).
    pub family: String,
    /// Rendered case name inside the family directory.
    pub case: String,
}

impl FieldKey {
    pub fn new(family: impl Into<String>, case: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            case: sanitize(&case.into()),
        }
    }

    /// Key for a straight tube case.
    ///
    /// `mesh_length_m` is the length of the meshed geometry, which may
    /// exceed the usable tube length by the inlet development zone.
    pub fn tube(
        radius_m: f64,
        mesh_length_m: f64,
        flow_rate_mlpmin: f64,
        mesh_resolution: u32,
        variant: &str,
    ) -> Self {
        let mut case = format!(
            "tube_r{:.2}mm_l{}cm_{}mlpmin_{}cells",
            radius_m * 1e3,
            round1(mesh_length_m * 1e2),
            round1(flow_rate_mlpmin),
            mesh_resolution,
        );
        if !variant.is_empty() {
            case.push('_');
            case.push_str(variant);
        }
        Self::new("tube", case)
    }

    /// Key for a Y-junction case, parameterized by both inlet rates.
    pub fn y_piece(
        radius_m: f64,
        background_rate_mlpmin: f64,
        injection_rate_mlpmin: f64,
        outlet_length_m: f64,
        mesh_resolution: u32,
        variant: &str,
    ) -> Self {
        let mut case = format!(
            "y-piece_r{:.2}mm_bg{}mlpmin_in{}mlpmin_o{:.0}cm_{}cells",
            radius_m * 1e3,
            round1(background_rate_mlpmin),
            round1(injection_rate_mlpmin),
            outlet_length_m * 1e2,
            mesh_resolution,
        );
        if !variant.is_empty() {
            case.push('_');
            case.push_str(variant);
        }
        Self::new("y_connector", case)
    }

    /// File name of the binary cache for this key.
    pub fn cache_file_name(&self) -> String {
        format!("{}__{}.bin", self.family, self.case)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.case)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Reduce a case name to characters safe for file names: alphanumerics,
/// dash, underscore, and dot. Spaces become underscores, everything else is
/// dropped.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                Some(c)
            } else if c == ' ' {
                Some('_')
            } else {
                None
            }
        })
        .collect()
}
