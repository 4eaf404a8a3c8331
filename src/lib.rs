//! This crate provides tools for simulating multi-population rate neural networks in Rust.
//!
//! # Building Networks
//!
//! A network is described by a [`config::NetworkConfig`], usually loaded from a YAML or JSON file.
//! The connectivity of every (postsynaptic, presynaptic) population pair is generated at construction.
//!
//! ```rust
//! use rusty_rates::config::NetworkConfig;
//! use rusty_rates::core::network::RateNetwork;
//!
//! // A single population of 1000 neurons with uniform all-to-all connectivity
//! let config = NetworkConfig::default();
//! let network = RateNetwork::from_config(&config).unwrap();
//!
//! assert_eq!(network.num_neurons(), 1000);
//! assert_eq!(network.weights().shape(), (1000, 1000));
//! ```
//!
//! # Simulating Networks
//!
//! ```rust
//! use rusty_rates::config::NetworkConfig;
//! use rusty_rates::core::network::RateNetwork;
//!
//! let config = NetworkConfig {
//!     n_neuron: 200,
//!     duration: 0.5,
//!     ..NetworkConfig::default()
//! };
//! let mut network = RateNetwork::from_config(&config).unwrap();
//!
//! // Run the simulation and collect one snapshot every sampling window
//! let trajectory = network.run();
//! assert_eq!(trajectory.shape(), (network.num_snapshots(), 200));
//! ```
pub mod config;
pub mod core;
pub mod error;
