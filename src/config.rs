//! Simulation configuration.
//!
//! Pair-valued fields (`structure`, `dense`, `kappa`, `jab`, `sigma`) are flattened row-major `n_pop × n_pop` matrices,
//! where the row is the postsynaptic population and the column the presynaptic population.
//! Optional pair and population fields may be left empty, in which case they default to zero (or `false`).
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::activation::TransferFunction;
use crate::core::connectivity::{ConnectivityMode, LowRankMode, StructureTag};
use crate::core::context::{Backend, ExecutionContext, Precision};
use crate::core::stimulus::StimulusProfile;
use crate::error::RateNetError;

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

/// The parameters of a simulation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Total number of neurons.
    pub n_neuron: usize,
    /// Number of populations.
    pub n_pop: usize,
    /// Fraction of the neurons in each population.
    pub frac: Vec<f64>,
    /// Total in-degree, split across populations proportionally to `frac`.
    pub k: f64,
    /// Rate time constant of each population.
    pub tau: Vec<f64>,
    /// Integration time step.
    pub dt: f64,
    /// Duration of the recorded part of the simulation.
    pub duration: f64,
    /// Settling time before recording starts.
    #[serde(default)]
    pub t_steady: f64,
    /// Time between two recorded snapshots.
    pub t_window: f64,
    /// Stimulus onset, measured from the start of the simulation (steady phase included).
    #[serde(default)]
    pub t_stim_on: f64,
    /// Stimulus offset, measured from the start of the simulation (steady phase included).
    #[serde(default)]
    pub t_stim_off: f64,
    /// Leaky-integrator rate dynamics; rates follow the transfer function instantaneously otherwise.
    #[serde(default = "default_true")]
    pub rate_dyn: bool,
    pub connectivity: ConnectivityMode,
    pub structure: Vec<StructureTag>,
    #[serde(default)]
    pub dense: Vec<bool>,
    /// Structure strength of each population pair.
    #[serde(default)]
    pub kappa: Vec<f64>,
    /// Preferred-direction offset of cosine structures, in degrees.
    #[serde(default)]
    pub phase: f64,
    /// Number of latent dimensions of low-rank structures, defaults to the length of `lr_mean`.
    #[serde(default)]
    pub lr_dim: Option<usize>,
    #[serde(default)]
    pub lr_mean: Vec<f64>,
    #[serde(default)]
    pub lr_cov: Vec<Vec<f64>>,
    #[serde(default)]
    pub lr_mode: Option<LowRankMode>,
    /// Unscaled synaptic strength of each population pair.
    pub jab: Vec<f64>,
    /// Unscaled feedforward drive of each population.
    pub ja0: Vec<f64>,
    /// Heterogeneity of all-to-all weights for each population pair.
    #[serde(default)]
    pub sigma: Vec<f64>,
    #[serde(default = "default_one")]
    pub gain: f64,
    /// Mean feedforward rate.
    #[serde(default = "default_one")]
    pub m0: f64,
    /// Variance of the feedforward noise, either global (one value) or per population.
    #[serde(default)]
    pub var_ff: Vec<f64>,
    #[serde(default)]
    pub bump_switch: Vec<bool>,
    /// External stimulus amplitude of each population.
    #[serde(default)]
    pub i0: Vec<f64>,
    /// Tuning depth of the stimulus.
    #[serde(default)]
    pub sigma0: f64,
    /// Stimulus location, in degrees.
    #[serde(default)]
    pub phi0: f64,
    #[serde(default)]
    pub stimulus_profile: StimulusProfile,
    #[serde(default)]
    pub transfer: TransferFunction,
    /// Seed of the connectivity random stream.
    #[serde(default)]
    pub seed: u64,
    /// Seed of the noise random stream, drawn from the OS when missing.
    #[serde(default)]
    pub noise_seed: Option<u64>,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub backend: Backend,
}

impl Default for NetworkConfig {
    /// A single population of 1000 neurons with uniform all-to-all connectivity.
    fn default() -> Self {
        NetworkConfig {
            n_neuron: 1000,
            n_pop: 1,
            frac: vec![1.0],
            k: 100.0,
            tau: vec![0.02],
            dt: 0.01,
            duration: 1.0,
            t_steady: 0.1,
            t_window: 0.05,
            t_stim_on: 0.0,
            t_stim_off: 0.0,
            rate_dyn: true,
            connectivity: ConnectivityMode::AllToAll,
            structure: vec![StructureTag::Uniform],
            dense: vec![],
            kappa: vec![],
            phase: 0.0,
            lr_dim: None,
            lr_mean: vec![],
            lr_cov: vec![],
            lr_mode: None,
            jab: vec![-1.0],
            ja0: vec![1.0],
            sigma: vec![],
            gain: 1.0,
            m0: 1.0,
            var_ff: vec![1.0],
            bump_switch: vec![],
            i0: vec![],
            sigma0: 0.0,
            phi0: 0.0,
            stimulus_profile: StimulusProfile::Cosine,
            transfer: TransferFunction::default(),
            seed: 0,
            noise_seed: Some(0),
            precision: Precision::Double,
            backend: Backend::Serial,
        }
    }
}

impl NetworkConfig {
    /// Load a configuration from a YAML (`.yml` or `.yaml`) or JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, RateNetError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RateNetError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        let config: NetworkConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") => serde_yaml::from_reader(reader)
                .map_err(|e| RateNetError::InvalidParameter(e.to_string()))?,
            _ => serde_json::from_reader(reader)
                .map_err(|e| RateNetError::InvalidParameter(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), RateNetError> {
        let file = File::create(path).map_err(|e| RateNetError::IOError(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| RateNetError::IOError(e.to_string()))?;
        writer.flush().map_err(|e| RateNetError::IOError(e.to_string()))
    }

    /// The execution context of the simulation.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.precision, self.backend)
    }

    fn pair(&self, post: usize, pre: usize) -> usize {
        post * self.n_pop + pre
    }

    pub fn structure(&self, post: usize, pre: usize) -> StructureTag {
        self.structure[self.pair(post, pre)]
    }

    pub fn jab(&self, post: usize, pre: usize) -> f64 {
        self.jab[self.pair(post, pre)]
    }

    pub fn kappa(&self, post: usize, pre: usize) -> f64 {
        self.kappa.get(self.pair(post, pre)).copied().unwrap_or(0.0)
    }

    pub fn sigma(&self, post: usize, pre: usize) -> f64 {
        self.sigma.get(self.pair(post, pre)).copied().unwrap_or(0.0)
    }

    pub fn dense(&self, post: usize, pre: usize) -> bool {
        self.dense.get(self.pair(post, pre)).copied().unwrap_or(false)
    }

    /// The feedforward noise variance of a population.
    pub fn var_ff(&self, pop: usize) -> f64 {
        match self.var_ff.len() {
            0 => 0.0,
            1 => self.var_ff[0],
            _ => self.var_ff[pop],
        }
    }

    pub fn bump_switch(&self, pop: usize) -> bool {
        self.bump_switch.get(pop).copied().unwrap_or(false)
    }

    pub fn i0(&self, pop: usize) -> f64 {
        self.i0.get(pop).copied().unwrap_or(0.0)
    }

    /// The number of latent dimensions of low-rank structures.
    pub fn lr_dim(&self) -> usize {
        self.lr_dim.unwrap_or(self.lr_mean.len())
    }

    /// Check every field eagerly, before anything is built.
    pub fn validate(&self) -> Result<(), RateNetError> {
        let p = self.n_pop;
        if p == 0 {
            return Err(RateNetError::InvalidParameter(
                "A network needs at least one population".to_string(),
            ));
        }
        if self.n_neuron == 0 {
            return Err(RateNetError::InvalidParameter(
                "A network needs at least one neuron".to_string(),
            ));
        }

        check_len("frac", self.frac.len(), &[p])?;
        check_len("tau", self.tau.len(), &[p])?;
        check_len("ja0", self.ja0.len(), &[p])?;
        check_len("structure", self.structure.len(), &[p * p])?;
        check_len("jab", self.jab.len(), &[p * p])?;
        check_len("kappa", self.kappa.len(), &[0, p * p])?;
        check_len("sigma", self.sigma.len(), &[0, p * p])?;
        check_len("dense", self.dense.len(), &[0, p * p])?;
        check_len("var_ff", self.var_ff.len(), &[0, 1, p])?;
        check_len("bump_switch", self.bump_switch.len(), &[0, p])?;
        check_len("i0", self.i0.len(), &[0, p])?;

        check_positive("dt", self.dt)?;
        check_non_negative("duration", self.duration)?;
        check_non_negative("t_steady", self.t_steady)?;
        check_non_negative("t_stim_on", self.t_stim_on)?;
        if !(self.t_window.is_finite() && self.t_window >= self.dt) {
            return Err(RateNetError::InvalidParameter(format!(
                "t_window ({}) must be at least one time step ({})",
                self.t_window, self.dt
            )));
        }
        if !(self.t_stim_off.is_finite() && self.t_stim_off >= self.t_stim_on) {
            return Err(RateNetError::InvalidParameter(format!(
                "t_stim_off ({}) must not precede t_stim_on ({})",
                self.t_stim_off, self.t_stim_on
            )));
        }
        check_non_negative("k", self.k)?;
        check_positive("thresh", self.transfer.thresh())?;
        for (name, value) in [
            ("gain", self.gain),
            ("m0", self.m0),
            ("phase", self.phase),
            ("sigma0", self.sigma0),
            ("phi0", self.phi0),
        ] {
            if !value.is_finite() {
                return Err(RateNetError::InvalidParameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        for value in self.sigma.iter() {
            check_non_negative("sigma", *value)?;
        }
        for value in self.var_ff.iter() {
            check_non_negative("var_ff", *value)?;
        }
        if self
            .jab
            .iter()
            .chain(self.ja0.iter())
            .chain(self.kappa.iter())
            .chain(self.i0.iter())
            .any(|v| !v.is_finite())
        {
            return Err(RateNetError::InvalidParameter(
                "Synaptic strengths, drives, structure strengths and stimulus amplitudes must be finite"
                    .to_string(),
            ));
        }

        if self.structure.contains(&StructureTag::LowRank) && self.lr_mean.is_empty() {
            return Err(RateNetError::InvalidParameter(
                "Low-rank structures need a latent mean (lr_mean)".to_string(),
            ));
        }
        if let StimulusProfile::Latent { .. } = self.stimulus_profile {
            if self.structure[0] != StructureTag::LowRank {
                return Err(RateNetError::InvalidStructure(
                    "A latent stimulus needs a low-rank structure on the primary population"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn check_len(name: &str, len: usize, allowed: &[usize]) -> Result<(), RateNetError> {
    if allowed.contains(&len) {
        Ok(())
    } else {
        Err(RateNetError::DimensionMismatch(format!(
            "{} has {} entries, expected one of {:?}",
            name, len, allowed
        )))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), RateNetError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RateNetError::InvalidParameter(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), RateNetError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RateNetError::InvalidParameter(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RING_YAML: &str = r#"
n_neuron: 2000
n_pop: 2
frac: [0.75, 0.25]
k: 500
tau: [0.02, 0.01]
dt: 0.001
duration: 2.0
t_steady: 0.5
t_window: 0.05
t_stim_on: 1.0
t_stim_off: 1.5
connectivity: sparse
structure: [cos, none, none, none]
kappa: [0.3, 0, 0, 0]
phase: 0
jab: [1.0, -1.5, 1.0, -1.0]
ja0: [2.0, 1.0]
gain: 1.0
var_ff: [1.0]
bump_switch: [true, false]
i0: [0.2, 0.0]
sigma0: 1.0
phi0: 180
transfer: {type: erf, thresh: 15}
seed: 1
precision: single
backend: parallel
"#;

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.yml");
        std::fs::write(&path, RING_YAML).unwrap();

        let config = NetworkConfig::load_from(&path).unwrap();
        assert_eq!(config.n_pop, 2);
        assert_eq!(config.structure(0, 0), StructureTag::CosineStrong);
        assert_eq!(config.structure(1, 0), StructureTag::None);
        assert_eq!(config.jab(0, 1), -1.5);
        assert_eq!(config.kappa(0, 0), 0.3);
        assert_eq!(config.sigma(1, 1), 0.0);
        assert!(!config.dense(0, 0));
        assert_eq!(config.var_ff(1), 1.0);
        assert!(config.bump_switch(0));
        assert_eq!(config.i0(1), 0.0);
        assert!(config.rate_dyn);
        assert_eq!(config.noise_seed, None);
        assert_eq!(config.precision, Precision::Single);
        assert_eq!(config.backend, Backend::Parallel);
    }

    #[test]
    fn test_save_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = NetworkConfig::default();
        config.save_to(&path).unwrap();
        assert_eq!(NetworkConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_unknown_structure_tag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        std::fs::write(&path, RING_YAML.replace("[cos, none", "[spiral, none")).unwrap();
        assert!(matches!(
            NetworkConfig::load_from(&path),
            Err(RateNetError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(NetworkConfig::default().validate().is_ok());

        let config = NetworkConfig {
            jab: vec![1.0, 2.0],
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateNetError::DimensionMismatch(_))
        ));

        let config = NetworkConfig {
            t_window: 0.001,
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateNetError::InvalidParameter(_))
        ));

        let config = NetworkConfig {
            t_stim_on: 0.5,
            t_stim_off: 0.2,
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateNetError::InvalidParameter(_))
        ));

        let config = NetworkConfig {
            var_ff: vec![-1.0],
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateNetError::InvalidParameter(_))
        ));

        let config = NetworkConfig {
            structure: vec![StructureTag::LowRank],
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateNetError::InvalidParameter(_))
        ));

        let config = NetworkConfig {
            stimulus_profile: StimulusProfile::Latent {
                component: 0,
                negative: false,
            },
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RateNetError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_defaults_of_optional_fields() {
        let config = NetworkConfig::default();
        assert_eq!(config.kappa(0, 0), 0.0);
        assert!(!config.bump_switch(0));
        assert_eq!(config.lr_dim(), 0);

        let config = NetworkConfig {
            var_ff: vec![],
            lr_mean: vec![0.0, 0.0],
            ..NetworkConfig::default()
        };
        assert_eq!(config.var_ff(0), 0.0);
        assert_eq!(config.lr_dim(), 2);
    }
}
