//! Stimulus schedule of a simulation, modeled as a finite state machine over integration steps.
//!
//! The phases follow each other as
//! `Constructed → Steady → Stimulated → Relaxed → Complete`.
//! Entering a phase yields bias updates; the recurrent weights are never touched.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::core::utils::ring_angles;
use crate::error::RateNetError;

/// The phase of a simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StimulusPhase {
    /// The network is built but no step has run.
    Constructed,
    /// Baseline drive, before stimulus onset.
    Steady,
    /// Stimulus-driven bias on the primary population.
    Stimulated,
    /// Baseline drive restored after stimulus offset.
    Relaxed,
    /// The run is over.
    Complete,
}

/// Step thresholds driving the phase transitions.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct StimulusSchedule {
    pub n_stim_on: usize,
    pub n_stim_off: usize,
    /// The total number of steps, i.e., the steady steps plus the recorded steps.
    pub n_end: usize,
}

impl StimulusSchedule {
    pub fn new(n_stim_on: usize, n_stim_off: usize, n_end: usize) -> Self {
        StimulusSchedule {
            n_stim_on,
            n_stim_off,
            n_end,
        }
    }

    /// The phase following `phase` at the given step, if a transition guard holds.
    /// Several transitions can fire at the same step, e.g., when the stimulus starts at step 0.
    pub fn next_phase(&self, phase: StimulusPhase, step: usize) -> Option<StimulusPhase> {
        match phase {
            StimulusPhase::Constructed => Some(StimulusPhase::Steady),
            StimulusPhase::Complete => None,
            _ if step >= self.n_end => Some(StimulusPhase::Complete),
            StimulusPhase::Steady if step >= self.n_stim_on => Some(StimulusPhase::Stimulated),
            StimulusPhase::Stimulated if step >= self.n_stim_off => Some(StimulusPhase::Relaxed),
            _ => None,
        }
    }
}

/// The spatial profile of the drive applied to the primary population during the stimulus.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StimulusProfile {
    /// `I0 (1 + SIGMA0 cos(theta - PHI0)) sqrt(Ka[0]) M0` added to the baseline drive.
    #[default]
    Cosine,
    /// `Ja0 (1 ± ksi[component] I0 M0)`, aligned with a latent vector of the primary low-rank block.
    Latent {
        component: usize,
        #[serde(default)]
        negative: bool,
    },
}

/// A change of the bias of one population.
#[derive(Debug, PartialEq, Clone)]
pub enum BiasUpdate {
    /// Every neuron of the population gets the same bias.
    Fill { population: usize, value: f64 },
    /// Neuron-specific biases.
    Profile {
        population: usize,
        values: DVector<f64>,
    },
}

/// The bias effects of the stimulus schedule.
#[derive(Debug, PartialEq, Clone)]
pub struct Stimulus {
    /// The scaled feedforward drive of each population.
    ja0: Vec<f64>,
    /// The baseline bias of bump-switch populations during the steady phase.
    steady_bias: Vec<f64>,
    bump_switch: Vec<bool>,
    /// The stimulus-driven bias of the primary population, present if any external drive is non-zero.
    drive: Option<DVector<f64>>,
}

impl Stimulus {
    pub fn new(
        ja0: Vec<f64>,
        steady_bias: Vec<f64>,
        bump_switch: Vec<bool>,
        drive: Option<DVector<f64>>,
    ) -> Result<Self, RateNetError> {
        if ja0.len() != steady_bias.len() || ja0.len() != bump_switch.len() {
            return Err(RateNetError::DimensionMismatch(format!(
                "Stimulus with {} drives, {} steady biases and {} bump switches",
                ja0.len(),
                steady_bias.len(),
                bump_switch.len()
            )));
        }
        Ok(Stimulus {
            ja0,
            steady_bias,
            bump_switch,
            drive,
        })
    }

    /// The scaled feedforward drive of each population.
    pub fn ja0(&self) -> &[f64] {
        &self.ja0
    }

    /// The stimulus-driven bias of the primary population.
    pub fn drive(&self) -> Option<&DVector<f64>> {
        self.drive.as_ref()
    }

    /// The bias updates to apply when entering a phase.
    pub fn on_enter(&self, phase: StimulusPhase) -> Vec<BiasUpdate> {
        match phase {
            StimulusPhase::Steady => self
                .bump_populations()
                .map(|population| BiasUpdate::Fill {
                    population,
                    value: self.steady_bias[population],
                })
                .collect(),
            StimulusPhase::Stimulated => {
                let mut updates: Vec<BiasUpdate> = self
                    .bump_populations()
                    .map(|population| BiasUpdate::Fill {
                        population,
                        value: self.ja0[population],
                    })
                    .collect();
                if let Some(drive) = &self.drive {
                    updates.push(BiasUpdate::Profile {
                        population: 0,
                        values: drive.clone(),
                    });
                }
                updates
            }
            StimulusPhase::Relaxed => match self.drive {
                Some(_) => vec![BiasUpdate::Fill {
                    population: 0,
                    value: self.ja0[0],
                }],
                None => vec![],
            },
            StimulusPhase::Constructed | StimulusPhase::Complete => vec![],
        }
    }

    fn bump_populations(&self) -> impl Iterator<Item = usize> + '_ {
        self.bump_switch
            .iter()
            .enumerate()
            .filter(|(_, bump)| **bump)
            .map(|(population, _)| population)
    }
}

/// The ring-tuned drive `i0 (1 + sigma0 cos(theta_a - phi0)) * scale` over `n` neurons, with `phi0` in radians.
pub fn cosine_shape(n: usize, i0: f64, sigma0: f64, phi0: f64, scale: f64) -> DVector<f64> {
    DVector::from_iterator(
        n,
        ring_angles(n)
            .into_iter()
            .map(|theta| i0 * (1.0 + sigma0 * (theta - phi0).cos()) * scale),
    )
}

/// The latent-aligned bias `ja0 (1 ± ksi[component] i0 m0)`.
pub fn latent_drive(
    ksi: &DMatrix<f64>,
    component: usize,
    negative: bool,
    ja0: f64,
    i0: f64,
    m0: f64,
) -> Result<DVector<f64>, RateNetError> {
    if component >= ksi.nrows() {
        return Err(RateNetError::DimensionMismatch(format!(
            "Latent component {} out of {} dimensions",
            component,
            ksi.nrows()
        )));
    }
    let sign = if negative { -1.0 } else { 1.0 };
    Ok(DVector::from_iterator(
        ksi.ncols(),
        ksi.row(component)
            .iter()
            .map(|k| ja0 * (1.0 + sign * k * i0 * m0)),
    ))
}
