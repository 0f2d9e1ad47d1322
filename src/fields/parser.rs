//! Parser for raw CFD case exports.
//!
//! A case directory contains one subdirectory per solver output time, named
//! after the time value (`0`, `0.1`, `1.5e-2`, ...). The loader picks the
//! numerically greatest valid time directory, which holds three plain-text
//! files:
//!
//! - `C` — cell centres: a count line followed by one `x y z` line per cell.
//! - `U` — per-cell velocities in the same layout.
//! - `boundary` — optional wall faces: lines of
//!   `cell_id nx ny nz px py pz` (unit face normal and a point on the face
//!   plane). The signed centre-to-plane distance is derived here.
//!
//! Everything is parsed into a [`VectorField`] in local mesh coordinates.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use nalgebra::Vector3;

use crate::error::{Result, SimulationError};
use crate::fields::vector_field::{Face, VectorField};

/// Find the subdirectory of `case_dir` whose name parses as the greatest
/// floating point value.
pub fn find_latest_time_dir(case_dir: &Path) -> Result<PathBuf> {
    let mut best: Option<(f64, PathBuf)> = None;
    for entry in fs::read_dir(case_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(time) = name.parse::<f64>() else { continue };
        if best.as_ref().map_or(true, |(t, _)| time > *t) {
            best = Some((time, entry.path()));
        }
    }
    best.map(|(_, path)| path).ok_or_else(|| SimulationError::Parse {
        path: case_dir.to_path_buf(),
        reason: "no time-step subdirectory found".into(),
    })
}

/// Parse the latest time step of a case directory into a [`VectorField`].
pub fn parse_case(case_dir: &Path) -> Result<VectorField> {
    let time_dir = find_latest_time_dir(case_dir)?;
    debug!("parsing flow field from {}", time_dir.display());

    let centres = read_vectors(&time_dir.join("C"))?;
    let flow = read_vectors(&time_dir.join("U"))?;
    if centres.len() != flow.len() {
        return Err(SimulationError::Parse {
            path: time_dir,
            reason: format!(
                "cell centre count {} does not match velocity count {}",
                centres.len(),
                flow.len()
            ),
        });
    }

    let boundary_path = time_dir.join("boundary");
    let boundary_faces = if boundary_path.is_file() {
        read_boundary_faces(&boundary_path, &centres)?
    } else {
        BTreeMap::new()
    };

    debug!(
        "parsed {} cells, {} boundary cells",
        centres.len(),
        boundary_faces.len()
    );
    Ok(VectorField::new(centres, flow, boundary_faces))
}

/// Read a count-prefixed list of 3-vectors.
fn read_vectors(path: &Path) -> Result<Vec<Vector3<f64>>> {
    let file = fs::File::open(path).map_err(|e| SimulationError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut lines = BufReader::new(file).lines();

    let count_line = lines
        .next()
        .transpose()?
        .ok_or_else(|| parse_error(path, "empty file"))?;
    let count: usize = count_line
        .trim()
        .parse()
        .map_err(|_| parse_error(path, &format!("invalid count line \"{count_line}\"")))?;

    let mut vectors = Vec::with_capacity(count);
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        vectors.push(parse_vector(trimmed).ok_or_else(|| {
            parse_error(path, &format!("malformed vector on line {}", line_no + 2))
        })?);
    }
    if vectors.len() != count {
        return Err(parse_error(
            path,
            &format!("expected {count} vectors, found {}", vectors.len()),
        ));
    }
    Ok(vectors)
}

fn read_boundary_faces(
    path: &Path,
    centres: &[Vector3<f64>],
) -> Result<BTreeMap<usize, Vec<Face>>> {
    let file = fs::File::open(path).map_err(|e| SimulationError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut faces: BTreeMap<usize, Vec<Face>> = BTreeMap::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<f64> = trimmed
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| {
                parse_error(path, &format!("malformed face on line {}", line_no + 1))
            })?;
        if fields.len() != 7 {
            return Err(parse_error(
                path,
                &format!("face on line {} needs 7 fields", line_no + 1),
            ));
        }
        let cell_id = fields[0] as usize;
        if cell_id >= centres.len() {
            return Err(parse_error(
                path,
                &format!("face on line {} references unknown cell {cell_id}", line_no + 1),
            ));
        }
        let normal = Vector3::new(fields[1], fields[2], fields[3]).normalize();
        let position = Vector3::new(fields[4], fields[5], fields[6]);
        let distance_to_centre = normal.dot(&(centres[cell_id] - position));
        faces.entry(cell_id).or_default().push(Face {
            position,
            normal,
            distance_to_centre,
        });
    }
    Ok(faces)
}

fn parse_vector(line: &str) -> Option<Vector3<f64>> {
    let mut parts = line.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Vector3::new(x, y, z))
}

fn parse_error(path: &Path, reason: &str) -> SimulationError {
    SimulationError::Parse {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn make_case(root: &Path, time: &str) -> PathBuf {
        let dir = root.join(time);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn latest_time_dir_wins() {
        let tmp = tempfile::tempdir().unwrap();
        make_case(tmp.path(), "0");
        make_case(tmp.path(), "0.5");
        make_case(tmp.path(), "1.25");
        make_case(tmp.path(), "notatime");
        let latest = find_latest_time_dir(tmp.path()).unwrap();
        assert!(latest.ends_with("1.25"));
    }

    #[test]
    fn missing_time_dirs_are_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_latest_time_dir(tmp.path()),
            Err(SimulationError::Parse { .. })
        ));
    }

    #[test]
    fn parses_a_small_case() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_case(tmp.path(), "2.0");
        write_file(&dir, "C", "2\n0 0 0\n0 0 1\n");
        write_file(&dir, "U", "2\n0 0 0.1\n0 0 0.2\n");
        write_file(&dir, "boundary", "0 1 0 0 0.5 0 0\n");
        let field = parse_case(tmp.path()).unwrap();
        assert_eq!(field.len(), 2);
        assert_eq!(field.flow[1], Vector3::new(0.0, 0.0, 0.2));
        assert!(field.at_boundary[0]);
        assert!(!field.at_boundary[1]);
        // Centre at origin, wall plane at x = 0.5 with +x normal.
        let face = &field.boundary_faces[&0][0];
        assert!((face.distance_to_centre + 0.5).abs() < 1e-12);
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_case(tmp.path(), "1");
        write_file(&dir, "C", "3\n0 0 0\n0 0 1\n");
        write_file(&dir, "U", "2\n0 0 0.1\n0 0 0.2\n");
        assert!(matches!(
            parse_case(tmp.path()),
            Err(SimulationError::Parse { .. })
        ));
    }

    #[test]
    fn malformed_vector_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = make_case(tmp.path(), "1");
        write_file(&dir, "C", "1\n0 0 zero\n");
        write_file(&dir, "U", "1\n0 0 0\n");
        assert!(parse_case(tmp.path()).is_err());
    }
}
