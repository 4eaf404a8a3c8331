//! Multi-population rate network and its time-stepped integration.
use derivative::Derivative;
use itertools::iproduct;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::time::Instant;

use crate::config::NetworkConfig;
use crate::core::activation::Activation;
use crate::core::connectivity::{Connectivity, LatentSource, Structure, StructureSpec};
use crate::core::context::ExecutionContext;
use crate::core::matrix::BlockMatrixBuilder;
use crate::core::population::Populations;
use crate::core::stimulus::{
    cosine_shape, latent_drive, BiasUpdate, Stimulus, StimulusPhase, StimulusProfile,
    StimulusSchedule,
};
use crate::core::trajectory::Trajectory;
use crate::core::utils::{deg_to_rad, num_steps};
use crate::core::{CONNECTIVITY_STREAM, NOISE_STREAM};
use crate::error::RateNetError;

/// Scale the synaptic strengths for balanced-network consistency: every entry is multiplied by `gain`
/// and every column (presynaptic population `b`) is divided by `sqrt(Kb)`.
pub fn scale_jab(jab: &DMatrix<f64>, gain: f64, in_degrees: &[f64]) -> Result<DMatrix<f64>, RateNetError> {
    if jab.ncols() != in_degrees.len() {
        return Err(RateNetError::DimensionMismatch(format!(
            "{} columns of synaptic strengths for {} in-degrees",
            jab.ncols(),
            in_degrees.len()
        )));
    }
    if let Some(k) = in_degrees.iter().find(|k| !(k.is_finite() && **k > 0.0)) {
        return Err(RateNetError::InvalidParameter(format!(
            "Scaling synaptic strengths needs positive in-degrees, got {}",
            k
        )));
    }
    Ok(DMatrix::from_fn(jab.nrows(), jab.ncols(), |a, b| {
        jab[(a, b)] * gain / in_degrees[b].sqrt()
    }))
}

/// The random stream of the connectivity generation.
pub fn connectivity_rng(seed: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(CONNECTIVITY_STREAM);
    rng
}

/// A recurrent rate network made of several populations.
///
/// The connectivity is generated once, at construction, from a dedicated random stream.
/// Running the network only mutates the rates and the bias of the stimulated populations.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RateNetwork {
    populations: Populations,
    ctx: ExecutionContext,
    dt: f64,
    duration: f64,
    rate_dyn: bool,
    n_steps: usize,
    n_steady: usize,
    n_window: usize,
    schedule: StimulusSchedule,
    stimulus: Stimulus,
    phase: StimulusPhase,
    /// The scaled synaptic strengths, indexed by (postsynaptic, presynaptic) population.
    jab: DMatrix<f64>,
    /// The full `N × N` weight matrix, indexed by (postsynaptic, presynaptic) neuron.
    weights: DMatrix<f64>,
    /// The feedforward drive of every neuron.
    bias: DVector<f64>,
    exp_dt_tau: DVector<f64>,
    dt_tau: DVector<f64>,
    /// The standard deviation of the feedforward noise of every neuron.
    noise_std: DVector<f64>,
    noise_seed: Option<u64>,
    /// The latent vectors of the low-rank blocks, indexed by population pair.
    latents: Vec<Option<DMatrix<f64>>>,
    #[derivative(Debug = "ignore")]
    activation: Box<dyn Activation>,
}

impl RateNetwork {
    /// Build a network with the transfer function selected in the configuration.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, RateNetError> {
        Self::new(config, config.transfer.into_activation())
    }

    /// Build a network with the provided transfer function.
    ///
    /// The configuration is validated first, then the connectivity of every (postsynaptic, presynaptic) population pair
    /// is generated and assembled into a single matrix. Any failure aborts the construction.
    pub fn new(config: &NetworkConfig, activation: Box<dyn Activation>) -> Result<Self, RateNetError> {
        config.validate()?;
        let ctx = config.context();

        let populations = Populations::new(
            config.n_neuron,
            &config.frac,
            config.k,
            &config.tau,
            config.connectivity,
        )?;
        let in_degrees = populations.in_degrees();
        let p = populations.len();
        log::info!(
            "Na {:?}, Ka {:?}, csumNa {:?}",
            populations.sizes(),
            in_degrees,
            populations.csum()
        );

        let exp_dt_tau = DVector::from_vec(populations.per_neuron(|pop| (-config.dt / pop.tau).exp()));
        let dt_tau = DVector::from_vec(populations.per_neuron(|pop| config.dt / pop.tau));
        log::debug!("DT {}, TAU {:?}", config.dt, config.tau);

        let jab = scale_jab(
            &DMatrix::from_row_slice(p, p, &config.jab),
            config.gain,
            &in_degrees,
        )?;
        let sqrt_ka0 = in_degrees[0].sqrt();
        let ja0: Vec<f64> = config.ja0.iter().map(|j| j * sqrt_ka0 * config.m0).collect();
        log::debug!("scaled Jab {:?}, scaled Ja0 {:?}", jab.as_slice(), ja0);

        let (weights, latents) = Self::assemble(config, &populations, &jab, ctx)?;

        let mut bias = DVector::from_vec(
            populations
                .iter()
                .zip(ja0.iter())
                .flat_map(|(pop, j)| std::iter::repeat(*j).take(pop.size()))
                .collect(),
        );
        ctx.precision.quantize_slice(bias.as_mut_slice());

        let noise_std = DVector::from_vec(
            populations
                .iter()
                .enumerate()
                .flat_map(|(i, pop)| std::iter::repeat(config.var_ff(i).sqrt()).take(pop.size()))
                .collect(),
        );

        let stimulus = Self::build_stimulus(config, &populations, &ja0, &latents)?;

        let n_steps = num_steps(config.duration, config.dt);
        let n_steady = num_steps(config.t_steady, config.dt);
        let n_window = num_steps(config.t_window, config.dt);
        let schedule = StimulusSchedule::new(
            num_steps(config.t_stim_on, config.dt),
            num_steps(config.t_stim_off, config.dt),
            n_steps + n_steady,
        );

        Ok(RateNetwork {
            populations,
            ctx,
            dt: config.dt,
            duration: config.duration,
            rate_dyn: config.rate_dyn,
            n_steps,
            n_steady,
            n_window,
            schedule,
            stimulus,
            phase: StimulusPhase::Constructed,
            jab,
            weights,
            bias,
            exp_dt_tau,
            dt_tau,
            noise_std,
            noise_seed: config.noise_seed,
            latents,
            activation,
        })
    }

    /// Generate the connectivity block of every population pair from the connectivity seed and assemble the full matrix.
    fn assemble(
        config: &NetworkConfig,
        populations: &Populations,
        jab: &DMatrix<f64>,
        ctx: ExecutionContext,
    ) -> Result<(DMatrix<f64>, Vec<Option<DMatrix<f64>>>), RateNetError> {
        let p = populations.len();
        let mut rng = connectivity_rng(config.seed);
        let mut builder = BlockMatrixBuilder::for_populations(populations);
        let mut latents = vec![None; p * p];

        for (post, pre) in iproduct!(0..p, 0..p) {
            let (na, nb, kb) = match (populations.get(post), populations.get(pre)) {
                (Some(a), Some(b)) => (a.size(), b.size(), b.in_degree),
                _ => {
                    return Err(RateNetError::InvalidParameter(format!(
                        "Population pair ({}, {}) out of bounds",
                        post, pre
                    )))
                }
            };

            let structure = Structure::from_tag(
                config.structure(post, pre),
                config.kappa(post, pre),
                deg_to_rad(config.phase),
                config.lr_dim(),
                LatentSource::Sample {
                    mean: config.lr_mean.clone(),
                    cov: config.lr_cov.clone(),
                },
                config.lr_mode,
            );
            log::debug!(
                "Pair ({}, {}): {:?} connectivity with {} structure",
                post,
                pre,
                config.connectivity,
                structure
            );
            let spec = StructureSpec::new(structure).dense(config.dense(post, pre));

            let mut connectivity = Connectivity::new(na, nb, kb)?;
            let block = connectivity.generate(
                &spec,
                config.connectivity,
                jab[(post, pre)],
                config.sigma(post, pre),
                ctx.precision,
                &mut rng,
            )?;
            builder.write_pair(populations, post, pre, &block)?;
            latents[post * p + pre] = connectivity.into_latent();
        }

        Ok((builder.build(), latents))
    }

    fn build_stimulus(
        config: &NetworkConfig,
        populations: &Populations,
        ja0: &[f64],
        latents: &[Option<DMatrix<f64>>],
    ) -> Result<Stimulus, RateNetError> {
        let p = populations.len();
        let sqrt_ka0 = populations.in_degrees()[0].sqrt();

        // Bump-switch populations start silent, or at a drive reduced by sqrt(Ka[0]) in finite in-degree networks.
        let steady_bias: Vec<f64> = (0..p)
            .map(|i| {
                if populations.k() != 1.0 {
                    ja0[i] / sqrt_ka0
                } else {
                    0.0
                }
            })
            .collect();
        let bump_switch: Vec<bool> = (0..p).map(|i| config.bump_switch(i)).collect();

        let drive = if (0..p).any(|i| config.i0(i) != 0.0) {
            let mut drive = match config.stimulus_profile {
                StimulusProfile::Cosine => {
                    let na0 = populations.get(0).map(|pop| pop.size()).unwrap_or(0);
                    cosine_shape(
                        na0,
                        config.i0(0),
                        config.sigma0,
                        deg_to_rad(config.phi0),
                        sqrt_ka0 * config.m0,
                    )
                    .add_scalar(ja0[0])
                }
                StimulusProfile::Latent {
                    component,
                    negative,
                } => {
                    let ksi = latents[0].as_ref().ok_or_else(|| {
                        RateNetError::InvalidStructure(
                            "A latent stimulus needs a low-rank structure on the primary population"
                                .to_string(),
                        )
                    })?;
                    latent_drive(ksi, component, negative, ja0[0], config.i0(0), config.m0)?
                }
            };
            config.precision.quantize_slice(drive.as_mut_slice());
            Some(drive)
        } else {
            None
        };

        Stimulus::new(
            ja0.to_vec(),
            steady_bias
                .into_iter()
                .map(|b| config.precision.quantize(b))
                .collect(),
            bump_switch,
            drive,
        )
    }

    pub fn populations(&self) -> &Populations {
        &self.populations
    }

    pub fn num_neurons(&self) -> usize {
        self.populations.num_neurons()
    }

    pub fn context(&self) -> ExecutionContext {
        self.ctx
    }

    /// The full weight matrix, indexed by (postsynaptic, presynaptic) neuron.
    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    /// The current feedforward drive of every neuron.
    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    /// The scaled synaptic strengths, indexed by (postsynaptic, presynaptic) population.
    pub fn jab(&self) -> &DMatrix<f64> {
        &self.jab
    }

    /// The scaled feedforward drive of every population.
    pub fn ja0(&self) -> &[f64] {
        self.stimulus.ja0()
    }

    pub fn stimulus(&self) -> &Stimulus {
        &self.stimulus
    }

    pub fn schedule(&self) -> &StimulusSchedule {
        &self.schedule
    }

    pub fn phase(&self) -> StimulusPhase {
        self.phase
    }

    pub fn exp_dt_tau(&self) -> &DVector<f64> {
        &self.exp_dt_tau
    }

    pub fn dt_tau(&self) -> &DVector<f64> {
        &self.dt_tau
    }

    /// The latent vectors of the low-rank block of a population pair, if any.
    pub fn latent(&self, post: usize, pre: usize) -> Option<&DMatrix<f64>> {
        let p = self.populations.len();
        if post >= p || pre >= p {
            return None;
        }
        self.latents[post * p + pre].as_ref()
    }

    /// The number of recorded steps.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// The number of settling steps before recording.
    pub fn n_steady(&self) -> usize {
        self.n_steady
    }

    /// The number of steps between two snapshots.
    pub fn n_window(&self) -> usize {
        self.n_window
    }

    /// The number of snapshots a run produces.
    pub fn num_snapshots(&self) -> usize {
        (self.n_steady + 1..self.schedule.n_end)
            .filter(|step| self.is_recorded(*step))
            .count()
    }

    fn is_recorded(&self, step: usize) -> bool {
        step > self.n_steady && step % self.n_window == 0
    }

    /// The recurrent input `W · rates + bias`.
    pub fn rec_input(&self, rates: &DVector<f64>) -> DVector<f64> {
        let mut rec_input = self.bias.clone();
        if self.ctx.use_parallel(self.num_neurons()) {
            // Each task multiplies a band of rows, whose columns are contiguous in the column-major storage.
            let band = self
                .num_neurons()
                .div_ceil(rayon::current_num_threads())
                .max(1);
            rec_input
                .as_mut_slice()
                .par_chunks_mut(band)
                .enumerate()
                .for_each(|(i, out)| {
                    let partial = self.weights.rows(i * band, out.len()) * rates;
                    out.iter_mut().zip(partial.iter()).for_each(|(o, p)| *o += p);
                });
        } else {
            rec_input.gemv(1.0, &self.weights, rates, 1.0);
        }
        rec_input
    }

    /// The net input, i.e., the recurrent input plus i.i.d. Gaussian feedforward noise.
    pub fn net_input<R: Rng>(&self, mut rec_input: DVector<f64>, rng: &mut R) -> DVector<f64> {
        rec_input
            .iter_mut()
            .zip(self.noise_std.iter())
            .filter(|(_, std)| **std > 0.0)
            .for_each(|(x, std)| *x += std * rng.sample::<f64, _>(StandardNormal));
        rec_input
    }

    /// The rates after one step: the exponential-Euler update of `tau dr/dt = -r + F(net_input)`,
    /// or `F(net_input)` directly without rate dynamics.
    pub fn update_rates(&self, rates: &DVector<f64>, mut net_input: DVector<f64>) -> DVector<f64> {
        let activation = &self.activation;
        if self.ctx.use_parallel(self.num_neurons()) {
            net_input
                .as_mut_slice()
                .par_iter_mut()
                .for_each(|x| *x = activation.eval(*x));
        } else {
            net_input.iter_mut().for_each(|x| *x = activation.eval(*x));
        }

        let mut new_rates = if self.rate_dyn {
            self.exp_dt_tau.component_mul(rates) + self.dt_tau.component_mul(&net_input)
        } else {
            net_input
        };
        self.ctx.precision.quantize_slice(new_rates.as_mut_slice());
        new_rates
    }

    /// Advance the rates by one time step.
    pub fn forward<R: Rng>(&self, rates: &DVector<f64>, rng: &mut R) -> DVector<f64> {
        let rec_input = self.rec_input(rates);
        let net_input = self.net_input(rec_input, rng);
        self.update_rates(rates, net_input)
    }

    /// Fire every phase transition whose guard holds at the given step and apply the resulting bias updates.
    pub fn advance(&mut self, step: usize) {
        while let Some(next) = self.schedule.next_phase(self.phase, step) {
            self.enter(next);
        }
    }

    fn enter(&mut self, phase: StimulusPhase) {
        match phase {
            StimulusPhase::Stimulated if self.stimulus.drive().is_some() => log::info!("STIM ON"),
            StimulusPhase::Relaxed if self.stimulus.drive().is_some() => log::info!("STIM OFF"),
            _ => log::trace!("Entering {:?} phase", phase),
        }
        for update in self.stimulus.on_enter(phase) {
            self.apply(update);
        }
        self.phase = phase;
    }

    fn apply(&mut self, update: BiasUpdate) {
        let precision = self.ctx.precision;
        match update {
            BiasUpdate::Fill { population, value } => {
                if let Some(pop) = self.populations.get(population) {
                    let value = precision.quantize(value);
                    self.bias
                        .rows_mut(pop.start, pop.size())
                        .iter_mut()
                        .for_each(|b| *b = value);
                }
            }
            BiasUpdate::Profile { population, values } => {
                if let Some(pop) = self.populations.get(population) {
                    self.bias.rows_mut(pop.start, pop.size()).copy_from(&values);
                }
            }
        }
    }

    /// Restore the baseline drive and the initial phase.
    pub fn reset(&mut self) {
        let ja0 = self.stimulus.ja0().to_vec();
        for (i, value) in ja0.into_iter().enumerate() {
            self.apply(BiasUpdate::Fill {
                population: i,
                value,
            });
        }
        self.phase = StimulusPhase::Constructed;
    }

    /// The random stream of the feedforward noise, seeded from the noise seed or from the OS.
    /// It runs on its own ChaCha stream, distinct from the connectivity stream.
    pub fn noise_rng(&self) -> ChaCha8Rng {
        let mut rng = match self.noise_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        rng.set_stream(NOISE_STREAM);
        rng
    }

    /// Run the simulation from zero rates and return the recorded snapshots, in simulation-time order.
    ///
    /// A snapshot is recorded at every step past the steady phase that is a multiple of the sampling window.
    pub fn run(&mut self) -> Trajectory {
        log::info!("Starting simulation...");
        let start = Instant::now();

        self.reset();
        let mut rng = self.noise_rng();
        let mut rates = DVector::zeros(self.num_neurons());
        let mut trajectory = Trajectory::new(self.num_neurons());

        for step in 0..self.schedule.n_end {
            self.advance(step);
            rates = self.forward(&rates, &mut rng);

            if self.is_recorded(step) {
                let time = (step - self.n_steady) as f64 * self.dt;
                self.log_activity(time, &rates);
                trajectory.record(time, rates.as_slice());
            }
        }
        self.advance(self.schedule.n_end);

        log::info!(
            "Simulation completed: {} snapshots of {} neurons in {:.3}s",
            trajectory.len(),
            self.num_neurons(),
            start.elapsed().as_secs_f64()
        );
        trajectory
    }

    fn log_activity(&self, time: f64, rates: &DVector<f64>) {
        if log::log_enabled!(log::Level::Debug) {
            let activity: Vec<f64> = self
                .populations
                .iter()
                .map(|pop| rates.rows(pop.start, pop.size()).mean())
                .collect();
            log::debug!(
                "times (s) {:.2}/{:.2} rates (Hz) {:.2?}",
                time,
                self.duration,
                activity
            );
        }
    }
}
