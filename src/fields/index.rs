//! Uniform-grid spatial index over cell centres.
//!
//! Nearest-neighbor and k-nearest queries walk outward from the bucket
//! containing the query point, one shell of buckets at a time, until the
//! best candidates found so far cannot be beaten by anything in a farther
//! shell. For the roughly uniform sample spacing of CFD meshes this gives
//! near-constant query cost without the pointer chasing of a tree.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Vector3;

/// Candidate ordered by descending distance, so the heap root is always the
/// worst of the current best k.
#[derive(Debug, PartialEq)]
struct Candidate {
    distance: f64,
    id: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Estimate of the mean nearest-sample spacing of a point set.
///
/// Uses the cube root of volume-per-point where the points span all three
/// axes; degenerate (flat or collinear) sets fall back to a per-axis
/// estimate so that callers never see a zero or denormal spacing.
pub(crate) fn mean_spacing(points: &[Vector3<f64>]) -> f64 {
    if points.len() < 2 {
        return 1.0;
    }
    let mut min = points[0];
    let mut max = points[0];
    for p in points {
        min = min.inf(p);
        max = max.sup(p);
    }
    let extent = max - min;
    let n = (points.len() as f64).cbrt();
    if extent.iter().all(|&e| e > 0.0) {
        return (extent.x * extent.y * extent.z / points.len() as f64).cbrt();
    }
    let mut sum = 0.0;
    let mut axes = 0usize;
    for i in 0..3 {
        if extent[i] > 0.0 {
            sum += extent[i] / n;
            axes += 1;
        }
    }
    if axes == 0 {
        1.0
    } else {
        sum / axes as f64
    }
}

/// Uniform grid bucketing over a fixed point set.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    points: Vec<Vector3<f64>>,
    origin: Vector3<f64>,
    bucket_size: f64,
    dims: [usize; 3],
    buckets: Vec<Vec<u32>>,
}

impl SpatialIndex {
    /// Build an index over the given points. The bucket edge length is
    /// derived from the mean point spacing so that buckets hold a handful
    /// of points each.
    pub fn build(points: Vec<Vector3<f64>>) -> Self {
        if points.is_empty() {
            return Self {
                points,
                origin: Vector3::zeros(),
                bucket_size: 1.0,
                dims: [1, 1, 1],
                buckets: vec![Vec::new()],
            };
        }
        let mut min = points[0];
        let mut max = points[0];
        for p in &points {
            min = min.inf(p);
            max = max.sup(p);
        }
        let extent = max - min;
        // Two mean spacings per bucket edge keeps occupancy around 8.
        let bucket_size = mean_spacing(&points) * 2.0;

        let dims = [
            grid_extent(extent.x, bucket_size),
            grid_extent(extent.y, bucket_size),
            grid_extent(extent.z, bucket_size),
        ];
        let mut buckets = vec![Vec::new(); dims[0] * dims[1] * dims[2]];
        for (id, p) in points.iter().enumerate() {
            let cell = clamp_cell(p, &min, bucket_size, &dims);
            buckets[flatten(cell, &dims)].push(id as u32);
        }
        Self {
            points,
            origin: min,
            bucket_size,
            dims,
            buckets,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, id: usize) -> &Vector3<f64> {
        &self.points[id]
    }

    /// Index and distance of the nearest point, or `None` on an empty index.
    pub fn nearest(&self, query: &Vector3<f64>) -> Option<(usize, f64)> {
        self.k_nearest(query, 1).into_iter().next()
    }

    /// The k nearest points in ascending distance order. Returns fewer than
    /// k entries when the index holds fewer points.
    pub fn k_nearest(&self, query: &Vector3<f64>, k: usize) -> Vec<(usize, f64)> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }
        let k = k.min(self.points.len());
        let centre = clamp_cell(query, &self.origin, self.bucket_size, &self.dims);
        let max_shell = self.dims.iter().max().copied().unwrap_or(1);

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::new();
        for shell in 0..=max_shell {
            // Once k candidates are collected, a farther shell can only
            // contain points beyond `worst` if the shell's inner boundary
            // already exceeds it.
            if heap.len() == k {
                let worst = heap.peek().map(|c| c.distance).unwrap_or(f64::INFINITY);
                let shell_min_distance = (shell as f64 - 1.0).max(0.0) * self.bucket_size;
                if shell_min_distance > worst {
                    break;
                }
            }
            self.visit_shell(centre, shell, |id| {
                let distance = (self.points[id] - query).norm();
                if heap.len() < k {
                    heap.push(Candidate { distance, id });
                } else if distance < heap.peek().map(|c| c.distance).unwrap_or(f64::INFINITY) {
                    heap.pop();
                    heap.push(Candidate { distance, id });
                }
            });
        }
        let mut result: Vec<(usize, f64)> = heap
            .into_iter()
            .map(|c| (c.id, c.distance))
            .collect();
        result.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        result
    }

    /// All point ids within `radius` of the query position.
    pub fn within_radius(&self, query: &Vector3<f64>, radius: f64) -> Vec<usize> {
        if self.points.is_empty() || radius < 0.0 {
            return Vec::new();
        }
        let centre = clamp_cell(query, &self.origin, self.bucket_size, &self.dims);
        let shells = (radius / self.bucket_size).ceil() as usize + 1;
        let mut result = Vec::new();
        for shell in 0..=shells {
            self.visit_shell(centre, shell, |id| {
                if (self.points[id] - query).norm() <= radius {
                    result.push(id);
                }
            });
        }
        result.sort_unstable();
        result
    }

    /// Invoke `visit` for every point in buckets whose Chebyshev distance
    /// from `centre` equals `shell`.
    fn visit_shell(&self, centre: [usize; 3], shell: usize, mut visit: impl FnMut(usize)) {
        let shell = shell as isize;
        let lo = |c: usize| c as isize - shell;
        let hi = |c: usize| c as isize + shell;
        for x in lo(centre[0])..=hi(centre[0]) {
            for y in lo(centre[1])..=hi(centre[1]) {
                for z in lo(centre[2])..=hi(centre[2]) {
                    let on_shell = (x - centre[0] as isize).abs() == shell
                        || (y - centre[1] as isize).abs() == shell
                        || (z - centre[2] as isize).abs() == shell;
                    if !on_shell {
                        continue;
                    }
                    if x < 0
                        || y < 0
                        || z < 0
                        || x as usize >= self.dims[0]
                        || y as usize >= self.dims[1]
                        || z as usize >= self.dims[2]
                    {
                        continue;
                    }
                    let bucket = flatten([x as usize, y as usize, z as usize], &self.dims);
                    for &id in &self.buckets[bucket] {
                        visit(id as usize);
                    }
                }
            }
        }
    }
}

fn grid_extent(extent: f64, bucket_size: f64) -> usize {
    ((extent / bucket_size).floor() as usize + 1).max(1)
}

fn clamp_cell(
    p: &Vector3<f64>,
    origin: &Vector3<f64>,
    bucket_size: f64,
    dims: &[usize; 3],
) -> [usize; 3] {
    let mut cell = [0usize; 3];
    for i in 0..3 {
        let raw = ((p[i] - origin[i]) / bucket_size).floor();
        cell[i] = raw.max(0.0) as usize;
        cell[i] = cell[i].min(dims[i] - 1);
    }
    cell
}

fn flatten(cell: [usize; 3], dims: &[usize; 3]) -> usize {
    (cell[2] * dims[1] + cell[1]) * dims[0] + cell[0]
}
