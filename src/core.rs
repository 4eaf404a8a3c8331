//! Core module defining the main components of the Rusty Rates library.
//!
//! - [`population`]: Partitions the neurons into populations
//! - [`connectivity`]: Synthesizes and realizes the connectivity block of a population pair
//! - [`matrix`]: Assembles the blocks into the full weight matrix
//! - [`activation`]: Maps net inputs to firing rates
//! - [`stimulus`]: Drives the bias of the network over the course of a simulation
//! - [`network`]: Builds the network and integrates its rate dynamics
//! - [`trajectory`]: Stores the recorded rates
//!
//! # Examples
//!
//! ```
//! use rusty_rates::core::population::Populations;
//! use rusty_rates::core::connectivity::ConnectivityMode;
//!
//! // Split 1000 neurons into an excitatory and an inhibitory population
//! let pops = Populations::new(1000, &[0.8, 0.2], 500.0, &[0.02, 0.01], ConnectivityMode::Sparse).unwrap();
//!
//! assert_eq!(pops.csum(), &[0, 800, 1000]);
//! assert_eq!(pops.in_degrees(), vec![400.0, 100.0]);
//! ```
pub mod activation;
pub mod connectivity;
pub mod context;
pub mod matrix;
pub mod network;
pub mod population;
pub mod stimulus;
pub mod trajectory;
pub mod utils;

/// Minimum number of neurons to consider parallel processing.
pub const MIN_PARALLEL_NEURONS: usize = 100;
/// Tolerance added before flooring a duration into a number of time steps.
pub const STEP_TOLERANCE: f64 = 1e-6;
/// ChaCha stream of the connectivity generation.
pub const CONNECTIVITY_STREAM: u64 = 0;
/// ChaCha stream of the feedforward noise, distinct from the connectivity stream for any pair of seeds.
pub const NOISE_STREAM: u64 = 1;
