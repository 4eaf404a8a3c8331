//! Recorded rate trajectories and their persistence.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use crate::core::context::Precision;
use crate::error::RateNetError;

/// NumPy format magic string.
const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// The header of a version 1.0 NumPy file is padded to a multiple of this alignment.
const NPY_ALIGNMENT: usize = 64;

/// An ordered sequence of rate snapshots, of shape `[num_snapshots, num_neurons]`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    num_neurons: usize,
    /// The simulated time of each snapshot, measured from the end of the steady phase.
    times: Vec<f64>,
    /// The snapshots, in simulation-time order.
    rates: Vec<Vec<f64>>,
}

impl Trajectory {
    /// Create an empty trajectory for `num_neurons` neurons.
    pub fn new(num_neurons: usize) -> Self {
        Trajectory {
            num_neurons,
            times: vec![],
            rates: vec![],
        }
    }

    /// Append a snapshot. Returns an error if its length differs from the number of neurons.
    pub fn push(&mut self, time: f64, rates: &[f64]) -> Result<(), RateNetError> {
        if rates.len() != self.num_neurons {
            return Err(RateNetError::DimensionMismatch(format!(
                "Snapshot of {} rates for {} neurons",
                rates.len(),
                self.num_neurons
            )));
        }
        self.times.push(time);
        self.rates.push(rates.to_vec());
        Ok(())
    }

    /// Append a snapshot produced by the integrator, whose length always matches.
    pub(crate) fn record(&mut self, time: f64, rates: &[f64]) {
        debug_assert_eq!(rates.len(), self.num_neurons);
        self.times.push(time);
        self.rates.push(rates.to_vec());
    }

    /// The number of snapshots.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn num_neurons(&self) -> usize {
        self.num_neurons
    }

    /// `(num_snapshots, num_neurons)`
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.num_neurons)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn get(&self, index: usize) -> Option<&[f64]> {
        self.rates.get(index).map(|r| r.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.rates.iter().map(|r| r.as_slice())
    }

    /// The mean rate over a range of neurons in every snapshot.
    pub fn population_mean(&self, neurons: Range<usize>) -> Vec<f64> {
        let size = neurons.len() as f64;
        self.rates
            .iter()
            .map(|r| r[neurons.clone()].iter().sum::<f64>() / size)
            .collect()
    }

    /// Save the trajectory to a JSON file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), RateNetError> {
        let file = File::create(path).map_err(|e| RateNetError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| RateNetError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| RateNetError::IOError(e.to_string()))
    }

    /// Load a trajectory from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, RateNetError> {
        let file = File::open(path).map_err(|e| RateNetError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| RateNetError::IOError(e.to_string()))
    }

    /// Save the snapshots as a C-ordered NumPy array (format version 1.0) of shape `[num_snapshots, num_neurons]`.
    pub fn save_npy<P: AsRef<Path>>(&self, path: P, precision: Precision) -> Result<(), RateNetError> {
        let file = File::create(path).map_err(|e| RateNetError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        self.write_npy(&mut writer, precision)
            .map_err(|e| RateNetError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| RateNetError::IOError(e.to_string()))
    }

    fn write_npy<W: Write>(&self, writer: &mut W, precision: Precision) -> std::io::Result<()> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, {}), }}",
            precision.npy_descr(),
            self.len(),
            self.num_neurons
        );
        // magic + version (2 bytes) + header length (2 bytes) + header + newline
        let unpadded = NPY_MAGIC.len() + 4 + header.len() + 1;
        let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
        header.extend(std::iter::repeat(' ').take(padding));
        header.push('\n');

        writer.write_all(NPY_MAGIC)?;
        writer.write_all(&[1, 0])?;
        writer.write_all(&(header.len() as u16).to_le_bytes())?;
        writer.write_all(header.as_bytes())?;
        for value in self.rates.iter().flatten() {
            match precision {
                Precision::Single => writer.write_all(&(*value as f32).to_le_bytes())?,
                Precision::Double => writer.write_all(&value.to_le_bytes())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn trajectory() -> Trajectory {
        let mut trajectory = Trajectory::new(3);
        trajectory.push(0.1, &[1.0, 2.0, 3.0]).unwrap();
        trajectory.push(0.2, &[4.0, 5.0, 6.0]).unwrap();
        trajectory
    }

    #[test]
    fn test_push() {
        let mut trajectory = trajectory();
        assert_eq!(trajectory.shape(), (2, 3));
        assert_eq!(trajectory.get(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(trajectory.times(), &[0.1, 0.2]);
        assert!(matches!(
            trajectory.push(0.3, &[1.0]),
            Err(RateNetError::DimensionMismatch(_))
        ));
        assert_eq!(trajectory.len(), 2);
    }

    #[test]
    fn test_population_mean() {
        let trajectory = trajectory();
        assert_eq!(trajectory.population_mean(0..2), vec![1.5, 4.5]);
        assert_eq!(trajectory.population_mean(2..3), vec![3.0, 6.0]);
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trajectory.json");
        let trajectory = trajectory();
        trajectory.save_to(&path).unwrap();
        assert_eq!(Trajectory::load_from(&path).unwrap(), trajectory);
        assert!(matches!(
            Trajectory::load_from(dir.path().join("missing.json")),
            Err(RateNetError::IOError(_))
        ));
    }

    #[test]
    fn test_save_npy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trajectory.npy");
        trajectory().save_npy(&path, Precision::Double).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..6], NPY_MAGIC);
        assert_eq!(&bytes[6..8], &[1, 0]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % NPY_ALIGNMENT, 0);

        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.contains("'descr': '<f8'"));
        assert!(header.contains("'shape': (2, 3)"));
        assert!(header.ends_with('\n'));

        let data = &bytes[10 + header_len..];
        assert_eq!(data.len(), 6 * 8);
        let last = f64::from_le_bytes(data[40..48].try_into().unwrap());
        assert_eq!(last, 6.0);

        let path = dir.path().join("trajectory_f32.npy");
        trajectory().save_npy(&path, Precision::Single).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!(bytes.len() - 10 - header_len, 6 * 4);
    }
}
