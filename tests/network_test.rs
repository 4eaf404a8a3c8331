use approx::assert_relative_eq;
use itertools::iproduct;
use std::path::PathBuf;

use rusty_rates::config::NetworkConfig;
use rusty_rates::core::connectivity::{ConnectivityMode, StructureTag};
use rusty_rates::core::context::{Backend, Precision};
use rusty_rates::core::network::RateNetwork;
use rusty_rates::core::stimulus::StimulusPhase;
use rusty_rates::error::RateNetError;

fn conf(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("conf").join(name)
}

fn excitatory_inhibitory() -> NetworkConfig {
    NetworkConfig {
        n_neuron: 500,
        n_pop: 2,
        frac: vec![0.8, 0.2],
        k: 50.0,
        tau: vec![0.02, 0.01],
        connectivity: ConnectivityMode::Sparse,
        structure: vec![
            StructureTag::CosineWeak,
            StructureTag::Uniform,
            StructureTag::VonMises,
            StructureTag::None,
        ],
        kappa: vec![0.5, 0.0, 1.0, 0.0],
        jab: vec![1.0, -1.5, 1.0, -1.0],
        ja0: vec![2.0, 1.0],
        duration: 0.3,
        t_stim_on: 0.15,
        t_stim_off: 0.25,
        bump_switch: vec![true, false],
        i0: vec![0.2, 0.0],
        sigma0: 1.0,
        phi0: 180.0,
        ..NetworkConfig::default()
    }
}

#[test]
fn test_single_population_without_rate_dynamics() {
    let config = NetworkConfig {
        rate_dyn: false,
        ..NetworkConfig::default()
    };
    let mut network = RateNetwork::from_config(&config).unwrap();
    let trajectory = network.run();

    assert_eq!(trajectory.shape(), (19, 1000));
    assert_eq!(network.phase(), StimulusPhase::Complete);
    assert!(trajectory
        .iter()
        .flatten()
        .all(|r| *r >= 0.0 && *r <= 15.0));

    assert_relative_eq!(trajectory.times()[0], 0.05, epsilon = 1e-12);
    assert_relative_eq!(trajectory.times()[18], 0.95, epsilon = 1e-12);
    assert!(trajectory.times().windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_single_population_with_rate_dynamics() {
    let mut network = RateNetwork::from_config(&NetworkConfig::default()).unwrap();
    let trajectory = network.run();
    assert_eq!(trajectory.shape(), (network.num_snapshots(), 1000));

    // Starting from zero rates, the exponential-Euler update stays below its fixed point at saturation.
    let decay = network.exp_dt_tau()[0];
    let gain = network.dt_tau()[0];
    let bound = 15.0 * gain / (1.0 - decay);
    assert!(trajectory
        .iter()
        .flatten()
        .all(|r| *r >= 0.0 && *r <= bound + 1e-9));

    // In this scenario the rates also stay within the range of the transfer function.
    assert!(trajectory
        .iter()
        .flatten()
        .all(|r| *r >= 0.0 && *r <= 15.0));
}

#[test]
fn test_noise_reproducibility() {
    let mut network = RateNetwork::from_config(&NetworkConfig::default()).unwrap();
    let first = network.run();
    let second = network.run();
    assert_eq!(first, second);

    let mut other = RateNetwork::from_config(&NetworkConfig {
        noise_seed: Some(7),
        ..NetworkConfig::default()
    })
    .unwrap();
    assert_eq!(network.weights(), other.weights());
    assert_ne!(other.run(), first);
}

#[test]
fn test_multi_population_run() {
    let mut network = RateNetwork::from_config(&excitatory_inhibitory()).unwrap();
    let pops = network.populations().clone();
    assert_eq!(pops.csum(), &[0, 400, 500]);
    assert_eq!(
        pops.csum()[pops.len()],
        pops.sizes().iter().sum::<usize>()
    );

    // Columns of each block scale as 1 / sqrt(Kb).
    let jab = network.jab().clone();
    for (post, pre) in iproduct!(0..2, 0..2) {
        let raw = excitatory_inhibitory().jab(post, pre);
        assert_relative_eq!(
            jab[(post, pre)] * pops.in_degrees()[pre].sqrt(),
            raw,
            epsilon = 1e-12
        );
    }

    let trajectory = network.run();
    assert_eq!(trajectory.shape(), (network.num_snapshots(), 500));
    assert!(trajectory.iter().flatten().all(|r| r.is_finite() && *r >= 0.0));

    // The stimulus is over at the end of the run and the baseline drive is back.
    let ja0 = network.ja0()[0];
    assert!(network.bias().rows(0, 400).iter().all(|b| *b == ja0));
}

#[test]
fn test_backends_agree() {
    let mut serial = RateNetwork::from_config(&excitatory_inhibitory()).unwrap();
    let mut parallel = RateNetwork::from_config(&NetworkConfig {
        backend: Backend::Parallel,
        ..excitatory_inhibitory()
    })
    .unwrap();
    assert_eq!(serial.weights(), parallel.weights());

    let a = serial.run();
    let b = parallel.run();
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .for_each(|(x, y)| assert_relative_eq!(x, y, epsilon = 1e-6));
}

#[test]
fn test_single_precision() {
    let mut network = RateNetwork::from_config(&NetworkConfig {
        precision: Precision::Single,
        n_neuron: 300,
        ..NetworkConfig::default()
    })
    .unwrap();
    assert!(network.weights().iter().all(|w| *w == (*w as f32) as f64));

    let trajectory = network.run();
    assert!(trajectory.iter().flatten().all(|r| *r == (*r as f32) as f64));
}

#[test]
fn test_ring_configuration() {
    let config = NetworkConfig::load_from(conf("ring.yml")).unwrap();
    let network = RateNetwork::from_config(&config).unwrap();
    assert_eq!(network.populations().sizes(), vec![1500, 500]);
    assert_eq!(network.n_steady(), 500);
    assert_eq!(network.schedule().n_stim_on, 1000);
    assert!(network.stimulus().drive().is_some());
    assert!(network.latent(0, 0).is_none());
}

#[test]
fn test_low_rank_configuration() {
    let config = NetworkConfig {
        n_neuron: 200,
        duration: 0.1,
        t_steady: 0.02,
        t_stim_on: 0.04,
        t_stim_off: 0.08,
        ..NetworkConfig::load_from(conf("low_rank.yml")).unwrap()
    };
    let mut network = RateNetwork::from_config(&config).unwrap();
    let ksi = network.latent(0, 0).unwrap().clone();
    assert_eq!(ksi.shape(), (2, 200));

    let trajectory = network.run();
    assert_eq!(trajectory.shape(), (network.num_snapshots(), 200));
    assert_eq!(network.bias()[0], network.ja0()[0]);
}

#[test]
fn test_malformed_configurations() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("unknown_tag.yml");
    std::fs::write(
        &path,
        "n_neuron: 10\nn_pop: 1\nfrac: [1.0]\nk: 1\ntau: [0.02]\ndt: 0.01\nduration: 1.0\n\
         t_window: 0.05\nconnectivity: all2all\nstructure: [ring]\njab: [-1.0]\nja0: [1.0]\n",
    )
    .unwrap();
    let err = NetworkConfig::load_from(&path).unwrap_err();
    assert!(err.is_configuration());

    let path = dir.path().join("mismatch.yml");
    std::fs::write(
        &path,
        "n_neuron: 10\nn_pop: 2\nfrac: [1.0]\nk: 1\ntau: [0.02]\ndt: 0.01\nduration: 1.0\n\
         t_window: 0.05\nconnectivity: all2all\nstructure: [none]\njab: [-1.0]\nja0: [1.0]\n",
    )
    .unwrap();
    assert!(matches!(
        NetworkConfig::load_from(&path),
        Err(RateNetError::DimensionMismatch(_))
    ));

    assert!(matches!(
        NetworkConfig::load_from(dir.path().join("missing.yml")),
        Err(RateNetError::IOError(_))
    ));

    // Low-rank blocks between populations of different sizes cannot be built.
    let config = NetworkConfig {
        structure: vec![StructureTag::LowRank; 4],
        lr_mean: vec![0.0, 0.0],
        lr_cov: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        ..excitatory_inhibitory()
    };
    assert!(matches!(
        RateNetwork::from_config(&config),
        Err(RateNetError::DimensionMismatch(_))
    ));
}
