//! Generation of structured connectivity blocks between two populations.
//!
//! A block is produced in two stages:
//! 1. a [`ProbabilityField`] of shape `Na × Nb` is synthesized from a [`Structure`] (uniform, gaussian, cosine, von Mises or low-rank);
//! 2. the field is realized into a weight block, either by Bernoulli sampling (sparse mode) or deterministically (all-to-all mode).
//!
//! Rows index the postsynaptic population `a` and columns the presynaptic population `b`.
//!
//! # Examples
//!
//! ```
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use rusty_rates::core::connectivity::{Connectivity, ConnectivityMode, Structure, StructureSpec};
//! use rusty_rates::core::context::Precision;
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//! let mut connectivity = Connectivity::new(100, 100, 10.0).unwrap();
//! let spec = StructureSpec::new(Structure::CosineStrong { kappa: 0.25, phase: 0.0 });
//! let block = connectivity
//!     .generate(&spec, ConnectivityMode::Sparse, 1.0, 0.0, Precision::Double, &mut rng)
//!     .unwrap();
//!
//! assert_eq!(block.shape(), (100, 100));
//! ```
use std::f64::consts::PI;
use std::fmt;

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::core::context::Precision;
use crate::core::utils::{bessel_i0, ring_angles};
use crate::error::RateNetError;

/// Whether connections are sampled or deterministic.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ConnectivityMode {
    /// Each connection exists with probability `Kb / Nb * Pij` (clamped to [0, 1]).
    #[serde(rename = "sparse")]
    Sparse,
    /// Every pair is connected with a continuous weight scaling as `1 / Nb`.
    #[serde(rename = "all2all", alias = "all_to_all")]
    AllToAll,
}

/// The generative rule of a probability field, as written in configuration files.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureTag {
    /// No structure, the field is constant.
    None,
    /// Constant field equal to one.
    #[serde(alias = "unif")]
    Uniform,
    /// I.i.d. standard normal field.
    Gaussian,
    /// Cosine tuning with strength `kappa`.
    #[serde(alias = "cos")]
    CosineStrong,
    /// Cosine tuning with strength `kappa / sqrt(Kb)`.
    #[serde(alias = "spec_cos", alias = "cos_spec")]
    CosineWeak,
    /// Normalized von Mises density.
    VonMises,
    /// Low-rank structure built from latent feature vectors.
    #[serde(alias = "lr")]
    LowRank,
}

/// How latent feature vectors are combined into a low-rank term.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowRankMode {
    /// `ksiᵀ · ksi`, a Gram matrix over the latent dimensions.
    Gram,
    /// `outer(ksi0, ksi1) + outer(ksi2, ksi3)`, two independent rank-2 modes. Requires four latent dimensions.
    CrossPairs,
}

impl LowRankMode {
    /// The mode used when none is requested explicitly.
    pub fn infer(latent_dim: usize) -> Self {
        if latent_dim == 4 {
            LowRankMode::CrossPairs
        } else {
            LowRankMode::Gram
        }
    }
}

/// Origin of the latent feature vectors of a low-rank structure.
#[derive(Debug, PartialEq, Clone)]
pub enum LatentSource {
    /// Sample the latent vectors from a multivariate normal distribution.
    Sample { mean: Vec<f64>, cov: Vec<Vec<f64>> },
    /// Use the provided latent matrix, of shape `(latent_dim, Nb)`.
    Fixed(DMatrix<f64>),
}

/// A structural primitive with its parameters.
#[derive(Debug, PartialEq, Clone)]
pub enum Structure {
    Uniform,
    Gaussian,
    CosineStrong {
        kappa: f64,
        /// Preferred-direction offset, in radians.
        phase: f64,
    },
    CosineWeak {
        kappa: f64,
        /// Preferred-direction offset, in radians.
        phase: f64,
    },
    VonMises {
        kappa: f64,
    },
    LowRank {
        kappa: f64,
        latent_dim: usize,
        latent: LatentSource,
        mode: Option<LowRankMode>,
    },
}

impl Structure {
    /// Interpret a configuration tag with the parameters of a population pair.
    pub fn from_tag(
        tag: StructureTag,
        kappa: f64,
        phase: f64,
        latent_dim: usize,
        latent: LatentSource,
        mode: Option<LowRankMode>,
    ) -> Self {
        match tag {
            StructureTag::None | StructureTag::Uniform => Structure::Uniform,
            StructureTag::Gaussian => Structure::Gaussian,
            StructureTag::CosineStrong => Structure::CosineStrong { kappa, phase },
            StructureTag::CosineWeak => Structure::CosineWeak { kappa, phase },
            StructureTag::VonMises => Structure::VonMises { kappa },
            StructureTag::LowRank => Structure::LowRank {
                kappa,
                latent_dim,
                latent,
                mode,
            },
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Structure::Uniform => write!(f, "uniform"),
            Structure::Gaussian => write!(f, "gaussian"),
            Structure::CosineStrong { kappa, .. } => write!(f, "strong cosine, KAPPA {:.2}", kappa),
            Structure::CosineWeak { kappa, .. } => write!(f, "weak cosine, KAPPA {:.2}", kappa),
            Structure::VonMises { kappa } => write!(f, "von Mises, KAPPA {:.2}", kappa),
            Structure::LowRank {
                kappa, latent_dim, ..
            } => write!(f, "weak low rank (rank {}), KAPPA {:.2}", latent_dim, kappa),
        }
    }
}

/// A structure together with the normalization of its all-to-all realization.
#[derive(Debug, PartialEq, Clone)]
pub struct StructureSpec {
    pub structure: Structure,
    /// Dense fields are normalized by `sqrt(Nb)` instead of `Nb` in all-to-all mode.
    pub dense: bool,
}

impl StructureSpec {
    pub fn new(structure: Structure) -> Self {
        StructureSpec {
            structure,
            dense: false,
        }
    }

    pub fn dense(mut self, dense: bool) -> Self {
        self.dense = dense;
        self
    }
}

/// The values of a probability field.
#[derive(Debug, PartialEq, Clone)]
pub enum FieldValues {
    Constant(f64),
    Matrix(DMatrix<f64>),
}

/// A connection-probability (or raw affinity) field of shape `Na × Nb`.
#[derive(Debug, PartialEq, Clone)]
pub struct ProbabilityField {
    pub values: FieldValues,
    pub dense: bool,
}

impl ProbabilityField {
    /// The field value for postsynaptic neuron `a` and presynaptic neuron `b`.
    pub fn get(&self, a: usize, b: usize) -> f64 {
        match &self.values {
            FieldValues::Constant(value) => *value,
            FieldValues::Matrix(matrix) => matrix[(a, b)],
        }
    }

    /// The field as a dense matrix.
    pub fn to_matrix(&self, na: usize, nb: usize) -> DMatrix<f64> {
        match &self.values {
            FieldValues::Constant(value) => DMatrix::from_element(na, nb, *value),
            FieldValues::Matrix(matrix) => matrix.clone(),
        }
    }
}

/// Connectivity generator for one ordered pair of populations.
#[derive(Debug, PartialEq, Clone)]
pub struct Connectivity {
    /// The number of postsynaptic neurons.
    na: usize,
    /// The number of presynaptic neurons.
    nb: usize,
    /// The in-degree from the presynaptic population.
    kb: f64,
    /// The latent vectors of the last low-rank field, of shape `(latent_dim, Nb)`.
    latent: Option<DMatrix<f64>>,
}

impl Connectivity {
    /// Create a generator for `na` postsynaptic and `nb` presynaptic neurons with in-degree `kb`.
    /// Returns an error if a population is empty or if the in-degree is negative.
    pub fn new(na: usize, nb: usize, kb: f64) -> Result<Self, RateNetError> {
        if na == 0 || nb == 0 {
            return Err(RateNetError::InvalidParameter(format!(
                "Populations must be non-empty, got Na = {} and Nb = {}",
                na, nb
            )));
        }
        if !(kb.is_finite() && kb >= 0.0) {
            return Err(RateNetError::InvalidParameter(format!(
                "In-degree must be finite and non-negative, got {}",
                kb
            )));
        }
        Ok(Connectivity {
            na,
            nb,
            kb,
            latent: None,
        })
    }

    pub fn na(&self) -> usize {
        self.na
    }

    pub fn nb(&self) -> usize {
        self.nb
    }

    pub fn kb(&self) -> f64 {
        self.kb
    }

    /// The latent vectors drawn (or received) by the last low-rank field, if any.
    pub fn latent(&self) -> Option<&DMatrix<f64>> {
        self.latent.as_ref()
    }

    /// Take ownership of the retained latent vectors.
    pub fn into_latent(self) -> Option<DMatrix<f64>> {
        self.latent
    }

    /// Synthesize the probability field of a structure.
    pub fn probability_field<R: Rng>(
        &mut self,
        spec: &StructureSpec,
        rng: &mut R,
    ) -> Result<ProbabilityField, RateNetError> {
        let values = match &spec.structure {
            Structure::Uniform => FieldValues::Constant(1.0),
            Structure::Gaussian => {
                FieldValues::Matrix(DMatrix::from_fn(self.na, self.nb, |_, _| {
                    rng.sample::<f64, _>(StandardNormal)
                }))
            }
            Structure::CosineStrong { kappa, phase } => {
                FieldValues::Matrix(self.cosine_field(*kappa, *phase))
            }
            Structure::CosineWeak { kappa, phase } => {
                let kappa = kappa / self.sqrt_kb()?;
                FieldValues::Matrix(self.cosine_field(kappa, *phase))
            }
            Structure::VonMises { kappa } => FieldValues::Matrix(self.von_mises_field(*kappa)),
            Structure::LowRank {
                kappa,
                latent_dim,
                latent,
                mode,
            } => FieldValues::Matrix(self.low_rank_field(*kappa, *latent_dim, latent, *mode, rng)?),
        };

        log::trace!("Probability field with {} structure", spec.structure);
        Ok(ProbabilityField {
            values,
            dense: spec.dense,
        })
    }

    /// Realize a probability field into a weight block scaled by the synaptic strength `jab`.
    ///
    /// In sparse mode, every entry is an independent Bernoulli draw with success probability `Kb / Nb * Pij`,
    /// always clamped to [0, 1]. In all-to-all mode, the block is `jab * Pij / Nb` (or `/ sqrt(Nb)` for dense fields),
    /// plus Gaussian heterogeneity of standard deviation `sigma / Nb` when `sigma > 0`.
    pub fn realize<R: Rng>(
        &self,
        field: &ProbabilityField,
        mode: ConnectivityMode,
        jab: f64,
        sigma: f64,
        precision: Precision,
        rng: &mut R,
    ) -> DMatrix<f64> {
        let nb = self.nb as f64;
        let mut block = match mode {
            ConnectivityMode::Sparse => {
                let scale = self.kb / nb;
                let mut num_clamped = 0usize;
                let block = DMatrix::from_fn(self.na, self.nb, |a, b| {
                    let proba = scale * field.get(a, b);
                    let clamped = proba.clamp(0.0, 1.0);
                    if clamped != proba {
                        num_clamped += 1;
                    }
                    if rng.gen::<f64>() < clamped {
                        jab
                    } else {
                        0.0
                    }
                });
                if num_clamped > 0 {
                    log::debug!(
                        "{} connection probabilities clamped to [0, 1] out of {}",
                        num_clamped,
                        self.na * self.nb
                    );
                }
                block
            }
            ConnectivityMode::AllToAll => {
                let norm = if field.dense { nb.sqrt() } else { nb };
                let mut block = DMatrix::from_fn(self.na, self.nb, |a, b| jab * field.get(a, b) / norm);
                if sigma > 0.0 {
                    log::debug!("All-to-all connectivity with heterogeneity, SIGMA {}", sigma);
                    block.iter_mut().for_each(|w| {
                        *w += sigma * rng.sample::<f64, _>(StandardNormal) / nb;
                    });
                }
                block
            }
        };
        precision.quantize_slice(block.as_mut_slice());
        block
    }

    /// Synthesize and realize a block in one go.
    pub fn generate<R: Rng>(
        &mut self,
        spec: &StructureSpec,
        mode: ConnectivityMode,
        jab: f64,
        sigma: f64,
        precision: Precision,
        rng: &mut R,
    ) -> Result<DMatrix<f64>, RateNetError> {
        let field = self.probability_field(spec, rng)?;
        Ok(self.realize(&field, mode, jab, sigma, precision, rng))
    }

    fn sqrt_kb(&self) -> Result<f64, RateNetError> {
        if self.kb > 0.0 {
            Ok(self.kb.sqrt())
        } else {
            Err(RateNetError::InvalidParameter(
                "Weak structures need a positive in-degree".to_string(),
            ))
        }
    }

    /// `1 + 2 kappa cos(theta_a - phi_b - phase)` on a ring.
    fn cosine_field(&self, kappa: f64, phase: f64) -> DMatrix<f64> {
        let theta = ring_angles(self.na);
        let phi = ring_angles(self.nb);
        DMatrix::from_fn(self.na, self.nb, |a, b| {
            1.0 + 2.0 * kappa * (theta[a] - phi[b] - phase).cos()
        })
    }

    /// `exp(kappa cos(theta_a - phi_b)) / (2π I0(kappa))` on a ring.
    fn von_mises_field(&self, kappa: f64) -> DMatrix<f64> {
        let theta = ring_angles(self.na);
        let phi = ring_angles(self.nb);
        let norm = 2.0 * PI * bessel_i0(kappa);
        DMatrix::from_fn(self.na, self.nb, |a, b| {
            (kappa * (theta[a] - phi[b]).cos()).exp() / norm
        })
    }

    /// `1 + kappa * Lij / sqrt(Kb)` where `Lij` is the low-rank term of the latent vectors.
    fn low_rank_field<R: Rng>(
        &mut self,
        kappa: f64,
        latent_dim: usize,
        latent: &LatentSource,
        mode: Option<LowRankMode>,
        rng: &mut R,
    ) -> Result<DMatrix<f64>, RateNetError> {
        if self.na != self.nb {
            return Err(RateNetError::DimensionMismatch(format!(
                "Low-rank structure needs populations of equal sizes, got {} and {}",
                self.na, self.nb
            )));
        }
        let sqrt_kb = self.sqrt_kb()?;

        let ksi = match latent {
            LatentSource::Sample { mean, cov } => {
                if mean.len() != latent_dim {
                    return Err(RateNetError::DimensionMismatch(format!(
                        "Latent dimension {} does not match the mean of dimension {}",
                        latent_dim,
                        mean.len()
                    )));
                }
                sample_latent(mean, cov, self.nb, rng)?
            }
            LatentSource::Fixed(ksi) => {
                if ksi.shape() != (latent_dim, self.nb) {
                    return Err(RateNetError::DimensionMismatch(format!(
                        "Latent vectors of shape {:?} instead of ({}, {})",
                        ksi.shape(),
                        latent_dim,
                        self.nb
                    )));
                }
                ksi.clone()
            }
        };

        let lij = match mode.unwrap_or_else(|| LowRankMode::infer(latent_dim)) {
            LowRankMode::CrossPairs => {
                if latent_dim != 4 {
                    return Err(RateNetError::DimensionMismatch(format!(
                        "Cross-pair low-rank structure needs 4 latent dimensions, got {}",
                        latent_dim
                    )));
                }
                DMatrix::from_fn(self.nb, self.nb, |a, b| {
                    ksi[(0, a)] * ksi[(1, b)] + ksi[(2, a)] * ksi[(3, b)]
                })
            }
            LowRankMode::Gram => ksi.tr_mul(&ksi),
        };

        self.latent = Some(ksi);
        Ok(lij.map(|l| 1.0 + kappa * l / sqrt_kb))
    }
}

/// Draw `n` latent vectors from a multivariate normal distribution, returned as the columns of a `(dim, n)` matrix.
/// In one dimension, the vectors are i.i.d. standard normals regardless of the mean and covariance.
pub fn sample_latent<R: Rng>(
    mean: &[f64],
    cov: &[Vec<f64>],
    n: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>, RateNetError> {
    let dim = mean.len();
    if dim == 0 {
        return Err(RateNetError::InvalidParameter(
            "Latent vectors need at least one dimension".to_string(),
        ));
    }
    if dim == 1 {
        return Ok(DMatrix::from_fn(1, n, |_, _| rng.sample::<f64, _>(StandardNormal)));
    }
    if cov.len() != dim || cov.iter().any(|row| row.len() != dim) {
        return Err(RateNetError::DimensionMismatch(format!(
            "Covariance must be a {}x{} matrix",
            dim, dim
        )));
    }

    let cov = DMatrix::from_fn(dim, dim, |i, j| cov[i][j]);
    let chol = cov.cholesky().ok_or_else(|| {
        RateNetError::InvalidParameter("Covariance is not positive definite".to_string())
    })?;
    let z = DMatrix::from_fn(dim, n, |_, _| rng.sample::<f64, _>(StandardNormal));
    let mut ksi = chol.l() * z;
    for mut column in ksi.column_iter_mut() {
        column
            .iter_mut()
            .zip(mean.iter())
            .for_each(|(x, m)| *x += m);
    }
    Ok(ksi)
}
