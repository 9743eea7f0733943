//! Photon-count-vs-energy spectra carried by rays.

use tracing::warn;

use crate::{Absorptionf32, Energyf32, Intensityf32};

/// Reference energy at which voxel absorption coefficients are defined (keV).
pub const REFERENCE_ENERGY: Energyf32 = 100.0;

/// Ascending-sorted `(energy, photon flow)` pairs. Never empty after
/// construction. The mean energy is recomputed eagerly on every mutation so
/// that shared spectra stay `Sync`.
#[derive(Clone, Debug, PartialEq)]
pub struct EnergySpectrum {
    bins: Vec<(Energyf32, Intensityf32)>,
    mean: Energyf32,
}

impl EnergySpectrum {
    pub fn new(mut bins: Vec<(Energyf32, Intensityf32)>) -> Self {
        if bins.is_empty() {
            warn!("empty energy spectrum; substituting a single dark bin at the reference energy");
            bins.push((REFERENCE_ENERGY, 0.0));
        }
        bins.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut spectrum = Self { bins, mean: 0.0 };
        spectrum.update_mean();
        spectrum
    }

    pub fn monoenergetic(energy: Energyf32, photons: Intensityf32) -> Self {
        Self::new(vec![(energy, photons)])
    }

    /// Bremsstrahlung ramp after Kramers: photon flow proportional to
    /// `peak/E - 1`, sampled at `n_bins` energies between `min` and `peak`,
    /// normalized to `total_photons`. A single bin collapses to a
    /// monoenergetic spectrum at the peak energy.
    pub fn bremsstrahlung(min: Energyf32, peak: Energyf32, n_bins: usize, total_photons: Intensityf32) -> Self {
        if n_bins <= 1 || peak <= min {
            return Self::monoenergetic(peak.max(min), total_photons);
        }
        let step = (peak - min) / n_bins as Energyf32;
        let mut bins: Vec<(Energyf32, Intensityf32)> = (0..n_bins)
            .map(|i| {
                let e = min + (i as Energyf32 + 0.5) * step;
                (e, peak / e - 1.0)
            })
            .collect();
        let sum: Intensityf32 = bins.iter().map(|(_, n)| n).sum();
        for (_, n) in bins.iter_mut() { *n *= total_photons / sum; }
        Self::new(bins)
    }

    pub fn bins(&self) -> &[(Energyf32, Intensityf32)] { &self.bins }

    pub fn mean_energy(&self) -> Energyf32 { self.mean }

    pub fn total_photons(&self) -> Intensityf32 {
        self.bins.iter().map(|(_, n)| n).sum()
    }

    /// Energy-weighted intensity: what a perfectly absorbing detector element
    /// would register.
    pub fn total_intensity(&self) -> Intensityf32 {
        self.bins.iter().map(|(e, n)| e * n).sum()
    }

    pub fn scale(&mut self, factor: Intensityf32) {
        for (_, n) in self.bins.iter_mut() { *n *= factor; }
        self.update_mean();
    }

    /// Beer-Lambert attenuation of every bin over `distance`, with the
    /// absorption coefficient evaluated per bin energy.
    pub fn attenuate(&mut self, distance: f32, mut absorption_at: impl FnMut(Energyf32) -> Absorptionf32) {
        for (e, n) in self.bins.iter_mut() {
            *n *= (-absorption_at(*e) * distance).exp();
        }
        self.update_mean();
    }

    /// Shift every bin energy through `map` (must be monotonic, so the
    /// ascending order survives). Used for the Compton energy loss of a
    /// deflected ray.
    pub fn map_energies(&mut self, mut map: impl FnMut(Energyf32) -> Energyf32) {
        for (e, _) in self.bins.iter_mut() { *e = map(*e); }
        self.bins.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.update_mean();
    }

    fn update_mean(&mut self) {
        let photons = self.total_photons();
        self.mean = if photons > 0.0 {
            self.bins.iter().map(|(e, n)| e * n).sum::<f32>() / photons
        } else {
            // Dark spectrum: fall back to the unweighted bin average
            self.bins.iter().map(|(e, _)| e).sum::<f32>() / self.bins.len() as f32
        };
    }
}
