//! plain-text tensor dumps and JSON run snapshots
//!
//! text format, one header line then one line per point and component:
//!
//! ```text
//! # ricci shape=1,4,4,4
//! 0 0 0 0 0 0 0.000000000000e0
//! ```
//!
//! columns are `it i j k mu nu value`; scalars use `mu = nu = 0`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::curvature::{CurvatureStats, Tensor2};
use crate::error::{FabricError, FabricResult};
use crate::geodesic::ParticleState;
use crate::lattice::Lattice;
use crate::metric::Metric;
use crate::sanitize::FieldStats;

fn header<W: Write>(out: &mut W, name: &str, lattice: &Lattice) -> FabricResult<()> {
    let [nt, nx, ny, nz] = lattice.shape;
    writeln!(out, "# {name} shape={nt},{nx},{ny},{nz}")?;
    Ok(())
}

fn check_len(lattice: &Lattice, found: usize) -> FabricResult<()> {
    if found != lattice.len() {
        return Err(FabricError::ShapeMismatch { expected: lattice.len(), found });
    }
    Ok(())
}

pub fn write_tensor2_field<W: Write>(out: &mut W, name: &str, lattice: &Lattice, values: &[Tensor2]) -> FabricResult<()> {
    check_len(lattice, values.len())?;
    header(out, name, lattice)?;
    for (idx, t) in values.iter().enumerate() {
        let [it, i, j, k] = lattice.coords(idx);
        for (mu, row) in t.iter().enumerate() {
            for (nu, v) in row.iter().enumerate() {
                writeln!(out, "{it} {i} {j} {k} {mu} {nu} {v:.12e}")?;
            }
        }
    }
    Ok(())
}

pub fn write_metric_field<W: Write>(out: &mut W, name: &str, lattice: &Lattice, metrics: &[Metric]) -> FabricResult<()> {
    let tensors: Vec<Tensor2> = metrics.iter().map(|m| m.g).collect();
    write_tensor2_field(out, name, lattice, &tensors)
}

pub fn write_scalar_field<W: Write>(out: &mut W, name: &str, lattice: &Lattice, values: &[f64]) -> FabricResult<()> {
    check_len(lattice, values.len())?;
    header(out, name, lattice)?;
    for (idx, v) in values.iter().enumerate() {
        let [it, i, j, k] = lattice.coords(idx);
        writeln!(out, "{it} {i} {j} {k} 0 0 {v:.12e}")?;
    }
    Ok(())
}

/// open `path` for a buffered dump
pub fn create_dump_file<P: AsRef<Path>>(path: P) -> FabricResult<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSnapshot {
    pub entity: u32,
    pub state: ParticleState,
    pub mass: f64,
    pub charge: f64,
}

/// summary of a fabric at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricSnapshot {
    pub step: usize,
    pub time: f64,
    pub particles: Vec<ParticleSnapshot>,
    pub scalar: FieldStats,
    pub scalar_energy: f64,
    pub em_energy: f64,
    pub dirac_norm: Option<f64>,
    pub dirac_energy: Option<f64>,
    pub newtonian_potential: FieldStats,
    pub curvature: CurvatureStats,
    /// non-finite values replaced since the run started
    pub clamped_values: usize,
    pub particles_removed: usize,
}

pub fn write_snapshot_json<P: AsRef<Path>>(path: P, snapshot: &FabricSnapshot) -> FabricResult<()> {
    let mut out = create_dump_file(path)?;
    serde_json::to_writer_pretty(&mut out, snapshot)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Boundary;

    #[test]
    fn metric_dump_has_header_and_sixteen_lines_per_point() {
        let lat = Lattice::spatial([2, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let mut buf = Vec::new();
        write_metric_field(&mut buf, "metric", &lat, &[Metric::minkowski(); 2]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# metric shape=1,2,1,1");
        assert_eq!(lines.len(), 1 + 2 * 16);
        let first: Vec<&str> = lines[1].split_whitespace().collect();
        assert_eq!(&first[..6], &["0", "0", "0", "0", "0", "0"]);
        assert_eq!(first[6].parse::<f64>().unwrap(), -1.0);
        // second point, g_33
        let last: Vec<&str> = lines[32].split_whitespace().collect();
        assert_eq!(&last[..6], &["0", "1", "0", "0", "3", "3"]);
    }

    #[test]
    fn scalar_dump_roundtrips_values() {
        let lat = Lattice::spatial([3, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let values = [0.5, -1.25e-7, 3.0];
        let mut buf = Vec::new();
        write_scalar_field(&mut buf, "phi", &lat, &values).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let parsed: Vec<f64> = text
            .lines()
            .skip(1)
            .map(|l| l.split_whitespace().last().unwrap().parse().unwrap())
            .collect();
        assert_eq!(parsed, values);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let lat = Lattice::spatial([3, 1, 1], 1.0, [0.0; 3], Boundary::Periodic).unwrap();
        let mut buf = Vec::new();
        assert!(write_scalar_field(&mut buf, "phi", &lat, &[1.0]).is_err());
        assert!(buf.is_empty());
    }
}
