//! Precomputed Compton angle-probability tables.
//!
//! One table row per energy: the Klein-Nishina differential cross-section,
//! weighted by the solid-angle factor `sin(theta)`, binned over deflection
//! angles. Sampling a deflection draws from the row nearest to the ray's
//! mean energy.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::spectrum::REFERENCE_ENERGY;
use crate::{Anglef32, Energyf32, ELECTRON_REST_ENERGY};

pub struct ComptonTables {
    energies: Vec<Energyf32>,
    angles: Vec<Anglef32>,
    samplers: Vec<WeightedIndex<f32>>,
    /// Total cross-section of each row relative to the reference energy.
    relative_cross_section: Vec<f32>,
}

impl ComptonTables {
    pub fn new(min_energy: Energyf32, max_energy: Energyf32, n_energies: usize, n_angles: usize) -> Self {
        let n_energies = n_energies.max(1);
        let n_angles = n_angles.max(8);

        let energy_step = (max_energy - min_energy) / n_energies as f32;
        let energies: Vec<Energyf32> = (0..n_energies)
            .map(|i| min_energy + (i as f32 + 0.5) * energy_step)
            .collect();

        let angle_step = std::f32::consts::PI / n_angles as f32;
        let angles: Vec<Anglef32> = (0..n_angles)
            .map(|i| (i as f32 + 0.5) * angle_step)
            .collect();

        let row_weights = |energy: Energyf32| -> Vec<f32> {
            angles.iter()
                  .map(|&theta| klein_nishina(energy, theta) * theta.sin())
                  .collect()
        };

        let samplers = energies.iter()
            .map(|&e| WeightedIndex::new(row_weights(e))
                 .expect("Klein-Nishina weights are strictly positive"))
            .collect();

        let total = |energy: Energyf32| -> f32 { row_weights(energy).iter().sum() };
        let reference_total = total(REFERENCE_ENERGY);
        let relative_cross_section = energies.iter().map(|&e| total(e) / reference_total).collect();

        Self { energies, angles, samplers, relative_cross_section }
    }

    fn row(&self, energy: Energyf32) -> usize {
        if self.energies.len() == 1 { return 0; }
        let step = self.energies[1] - self.energies[0];
        let i = ((energy - self.energies[0]) / step).round();
        (i.max(0.0) as usize).min(self.energies.len() - 1)
    }

    /// Total scattering cross-section at `energy`, relative to the reference
    /// energy. Multiplied with the local density proxy to obtain a scatter
    /// coefficient.
    pub fn relative_cross_section(&self, energy: Energyf32) -> f32 {
        self.relative_cross_section[self.row(energy)]
    }

    /// Draw a deflection angle for a photon of the given mean energy.
    pub fn sample_angle(&self, energy: Energyf32, rng: &mut impl Rng) -> Anglef32 {
        self.angles[self.samplers[self.row(energy)].sample(rng)]
    }
}

/// Klein-Nishina differential cross-section, up to a constant factor.
fn klein_nishina(energy: Energyf32, theta: Anglef32) -> f32 {
    let k = energy / ELECTRON_REST_ENERGY;
    let p = 1.0 / (1.0 + k * (1.0 - theta.cos()));
    let s = theta.sin();
    0.5 * p * p * (p + 1.0 / p - s * s)
}

/// Photon energy after a Compton deflection by `theta`.
pub fn scattered_energy(energy: Energyf32, theta: Anglef32) -> Energyf32 {
    energy / (1.0 + (energy / ELECTRON_REST_ENERGY) * (1.0 - theta.cos()))
}
