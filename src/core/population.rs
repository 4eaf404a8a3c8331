//! Partition of the neuron index space into populations.
use std::ops::Range;

use crate::core::connectivity::ConnectivityMode;
use crate::error::RateNetError;

/// A population, i.e., a contiguous range of neuron indices sharing a time constant and an in-degree target.
#[derive(Debug, PartialEq, Clone)]
pub struct Population {
    /// Index of the first neuron of the population.
    pub start: usize,
    /// One past the index of the last neuron of the population.
    pub end: usize,
    /// Target average number of structured inputs received from this population.
    pub in_degree: f64,
    /// Rate time constant.
    pub tau: f64,
}

impl Population {
    /// Number of neurons in the population.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// The populations of a network, partitioning `[0, num_neurons)`.
#[derive(Debug, PartialEq, Clone)]
pub struct Populations {
    populations: Vec<Population>,
    /// The cumulative sizes, starting at 0 and ending at the total number of neurons.
    csum: Vec<usize>,
    /// The total in-degree, forced to 1 for all-to-all networks.
    k: f64,
}

impl Populations {
    /// Split `num_neurons` neurons into populations of sizes `round(num_neurons * frac[i])` and in-degrees `k * frac[i]`.
    /// In all-to-all mode, the in-degree `k` is replaced by 1.
    ///
    /// Returns an error if the fractions and time constants have different lengths, if a population is empty,
    /// or if the population sizes do not add up to `num_neurons`.
    pub fn new(
        num_neurons: usize,
        frac: &[f64],
        k: f64,
        tau: &[f64],
        mode: ConnectivityMode,
    ) -> Result<Self, RateNetError> {
        if frac.is_empty() {
            return Err(RateNetError::InvalidParameter(
                "A network needs at least one population".to_string(),
            ));
        }
        if frac.len() != tau.len() {
            return Err(RateNetError::DimensionMismatch(format!(
                "{} population fractions for {} time constants",
                frac.len(),
                tau.len()
            )));
        }
        if !(k.is_finite() && k >= 0.0) {
            return Err(RateNetError::InvalidParameter(format!(
                "In-degree must be finite and non-negative, got {}",
                k
            )));
        }

        let k = match mode {
            ConnectivityMode::AllToAll => 1.0,
            ConnectivityMode::Sparse => k,
        };

        let mut csum = Vec::with_capacity(frac.len() + 1);
        csum.push(0);
        let mut populations = Vec::with_capacity(frac.len());
        for (i, (&f, &t)) in frac.iter().zip(tau.iter()).enumerate() {
            if !(f.is_finite() && f > 0.0) {
                return Err(RateNetError::InvalidParameter(format!(
                    "Population {} has an invalid fraction {}",
                    i, f
                )));
            }
            if !(t.is_finite() && t > 0.0) {
                return Err(RateNetError::InvalidParameter(format!(
                    "Population {} has a non-positive time constant {}",
                    i, t
                )));
            }
            let size = (num_neurons as f64 * f).round() as usize;
            if size == 0 {
                return Err(RateNetError::InvalidParameter(format!(
                    "Population {} is empty",
                    i
                )));
            }
            let start = csum[i];
            csum.push(start + size);
            populations.push(Population {
                start,
                end: start + size,
                in_degree: k * f,
                tau: t,
            });
        }

        if csum[frac.len()] != num_neurons {
            return Err(RateNetError::DimensionMismatch(format!(
                "Population sizes add up to {} instead of {} neurons",
                csum[frac.len()],
                num_neurons
            )));
        }

        Ok(Populations {
            populations,
            csum,
            k,
        })
    }

    /// The number of populations.
    pub fn len(&self) -> usize {
        self.populations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }

    /// The total number of neurons.
    pub fn num_neurons(&self) -> usize {
        self.csum[self.len()]
    }

    /// The effective total in-degree.
    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn get(&self, pop: usize) -> Option<&Population> {
        self.populations.get(pop)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Population> {
        self.populations.iter()
    }

    /// The cumulative population sizes, of length `len() + 1`.
    pub fn csum(&self) -> &[usize] {
        &self.csum
    }

    /// The population sizes.
    pub fn sizes(&self) -> Vec<usize> {
        self.populations.iter().map(|p| p.size()).collect()
    }

    /// The in-degrees of the populations.
    pub fn in_degrees(&self) -> Vec<f64> {
        self.populations.iter().map(|p| p.in_degree).collect()
    }

    /// The population a neuron belongs to.
    pub fn population_of(&self, neuron: usize) -> Option<usize> {
        self.populations.iter().position(|p| p.range().contains(&neuron))
    }

    /// A per-neuron vector where every neuron of population `i` holds `f(population i)`.
    pub fn per_neuron<F: Fn(&Population) -> f64>(&self, f: F) -> Vec<f64> {
        self.populations
            .iter()
            .flat_map(|p| std::iter::repeat(f(p)).take(p.size()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partition() {
        let pops =
            Populations::new(1000, &[0.75, 0.25], 400.0, &[0.02, 0.01], ConnectivityMode::Sparse)
                .unwrap();

        assert_eq!(pops.len(), 2);
        assert_eq!(pops.csum(), &[0, 750, 1000]);
        assert_eq!(pops.sizes(), vec![750, 250]);
        assert_eq!(pops.sizes().iter().sum::<usize>(), pops.num_neurons());
        assert!(pops.csum().windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(pops.in_degrees()[0], 300.0);
        assert_relative_eq!(pops.in_degrees()[1], 100.0);
        assert_eq!(pops.population_of(749), Some(0));
        assert_eq!(pops.population_of(750), Some(1));
        assert_eq!(pops.population_of(1000), None);
    }

    #[test]
    fn test_all_to_all_in_degree() {
        let pops =
            Populations::new(100, &[0.5, 0.5], 400.0, &[1.0, 1.0], ConnectivityMode::AllToAll)
                .unwrap();
        assert_relative_eq!(pops.k(), 1.0);
        assert_relative_eq!(pops.in_degrees()[0], 0.5);
    }

    #[test]
    fn test_per_neuron() {
        let pops =
            Populations::new(5, &[0.6, 0.4], 1.0, &[2.0, 4.0], ConnectivityMode::Sparse).unwrap();
        assert_eq!(pops.per_neuron(|p| p.tau), vec![2.0, 2.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_invalid_partitions() {
        assert_eq!(
            Populations::new(10, &[0.5, 0.4], 1.0, &[1.0, 1.0], ConnectivityMode::Sparse),
            Err(RateNetError::DimensionMismatch(
                "Population sizes add up to 9 instead of 10 neurons".to_string()
            ))
        );
        assert!(matches!(
            Populations::new(10, &[1.0, 0.01], 1.0, &[1.0, 1.0], ConnectivityMode::Sparse),
            Err(RateNetError::InvalidParameter(_))
        ));
        assert!(matches!(
            Populations::new(10, &[1.0], -1.0, &[1.0], ConnectivityMode::Sparse),
            Err(RateNetError::InvalidParameter(_))
        ));
        assert!(matches!(
            Populations::new(10, &[1.0], 1.0, &[1.0, 2.0], ConnectivityMode::Sparse),
            Err(RateNetError::DimensionMismatch(_))
        ));
    }
}
