//! Convolution filters applied to sinogram rows before backprojection.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use crate::projections::Projections;
use crate::{Intensityf32, Lengthf32};

/// Named high-pass kernels. `Constant` is the identity transform and
/// short-circuits the convolution entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconstructionFilter {
    RamLak,
    SheppLogan,
    Constant,
}

impl FromStr for ReconstructionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ram-lak" | "ramlak"           => Ok(Self::RamLak),
            "shepp-logan" | "shepplogan"   => Ok(Self::SheppLogan),
            "constant"                     => Ok(Self::Constant),
            other => Err(format!("unknown reconstruction filter `{other}`")),
        }
    }
}

impl fmt::Display for ReconstructionFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::RamLak     => "ram-lak",
            Self::SheppLogan => "shepp-logan",
            Self::Constant   => "constant",
        })
    }
}

impl ReconstructionFilter {
    /// Kernel value at signed index `k`, for distance resolution `dd`.
    /// Kernels are defined over `[-(n-1), n-1]`.
    pub fn value_at(&self, k: i64, dd: Lengthf32) -> f32 {
        let dd2 = dd * dd;
        match self {
            Self::Constant => if k == 0 { 1.0 } else { 0.0 },
            Self::RamLak => {
                if k == 0 { 1.0 / (4.0 * dd2) }
                else if k % 2 == 0 { 0.0 }
                else {
                    let pk = std::f32::consts::PI * k as f32;
                    -1.0 / (pk * pk * dd2)
                }
            }
            Self::SheppLogan => {
                let k2 = (k * k) as f32;
                let pi2 = std::f32::consts::PI * std::f32::consts::PI;
                -2.0 / (pi2 * dd2 * (4.0 * k2 - 1.0))
            }
        }
    }

    /// Kernel over the full symmetric index range for `n` distances.
    pub fn kernel(&self, n: usize, dd: Lengthf32) -> Vec<f32> {
        let half = n as i64 - 1;
        (-half..=half).map(|k| self.value_at(k, dd)).collect()
    }
}

/// Sinogram with every row convolved with the reconstruction kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredProjections {
    pub data: Array2<Intensityf32>,
    pub angle_resolution: f32,
    pub distance_resolution: Lengthf32,
}

impl FilteredProjections {
    pub fn new(projections: &Projections, filter: ReconstructionFilter) -> Self {
        let data = match filter {
            // Identity: no convolution, no scaling
            ReconstructionFilter::Constant => projections.data.clone(),
            _ => convolve_rows(projections, filter),
        };
        Self {
            data,
            angle_resolution: projections.angle_resolution,
            distance_resolution: projections.distance_resolution,
        }
    }

    pub fn n_angles(&self)    -> usize { self.data.nrows() }
    pub fn n_distances(&self) -> usize { self.data.ncols() }

    pub fn distance_range(&self) -> Lengthf32 {
        self.distance_resolution * self.n_distances() as f32
    }

    /// Filtered value at (angle row, continuous distance index). Exact hits
    /// return the sample directly; fractional positions interpolate linearly
    /// between the floor and ceil samples; outside the row the (zero-padded)
    /// signal is zero.
    pub fn interpolated(&self, angle: usize, distance_index: f32) -> Intensityf32 {
        let last = (self.n_distances() - 1) as f32;
        if distance_index < 0.0 || distance_index > last { return 0.0; }
        let lo = distance_index.floor() as usize;
        let hi = distance_index.ceil() as usize;
        if lo == hi { return self.data[[angle, lo]]; }
        let frac = distance_index - lo as f32;
        self.data[[angle, lo]] * (1.0 - frac) + self.data[[angle, hi]] * frac
    }
}

/// Discrete convolution of every sinogram row with the kernel, zero padding
/// outside the row, scaled by the distance resolution.
fn convolve_rows(projections: &Projections, filter: ReconstructionFilter) -> Array2<Intensityf32> {
    let (n_angles, n_distances) = projections.data.dim();
    let dd = projections.distance_resolution;
    let kernel = filter.kernel(n_distances, dd);
    let half = n_distances as i64 - 1;

    let mut out = Array2::zeros((n_angles, n_distances));
    for a in 0..n_angles {
        for i in 0..n_distances as i64 {
            let mut acc = 0.0;
            for j in 0..n_distances as i64 {
                let k = i - j;
                acc += projections.data[[a, j as usize]] * kernel[(k + half) as usize];
            }
            out[[a, i as usize]] = acc * dd;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectionsProperties;
    use float_eq::assert_float_eq;
    use ndarray::arr2;
    use rstest::rstest;

    fn sample_projections() -> Projections {
        let props = ProjectionsProperties {
            number_of_angles: 2,
            number_of_distances: 5,
            measuring_field_size: 10.0,
        };
        let mut p = Projections::new(&props);
        p.set_column(0, &[0.0, 1.0, 4.0, 1.0, 0.0]);
        p.set_column(1, &[2.0, 2.0, 2.0, 2.0, 2.0]);
        p
    }

    #[rstest]
    #[case("ram-lak", ReconstructionFilter::RamLak)]
    #[case("Shepp-Logan", ReconstructionFilter::SheppLogan)]
    #[case("CONSTANT", ReconstructionFilter::Constant)]
    fn filter_names_parse(#[case] name: &str, #[case] expected: ReconstructionFilter) {
        assert_eq!(name.parse::<ReconstructionFilter>().unwrap(), expected);
    }

    #[test]
    fn unknown_filter_name_is_an_error() {
        assert!("gauss".parse::<ReconstructionFilter>().is_err());
    }

    #[test]
    fn constant_filter_is_identity() {
        let p = sample_projections();
        let filtered = FilteredProjections::new(&p, ReconstructionFilter::Constant);
        assert_eq!(filtered.data, p.data);
    }

    #[test]
    fn ram_lak_kernel_shape() {
        let dd = 2.0;
        let f = ReconstructionFilter::RamLak;
        assert_float_eq!(f.value_at(0, dd), 1.0 / 16.0, abs <= 1e-7);
        assert_float_eq!(f.value_at(2, dd), 0.0, abs <= 1e-9);
        assert!(f.value_at(1, dd) < 0.0);
        // Symmetric
        assert_float_eq!(f.value_at(-3, dd), f.value_at(3, dd), abs <= 1e-9);
    }

    #[test]
    fn kernel_covers_symmetric_index_range() {
        let kernel = ReconstructionFilter::RamLak.kernel(5, 1.0);
        assert_eq!(kernel.len(), 9); // [-4, 4]
    }

    #[test]
    fn convolution_matches_hand_computed_row() {
        // Single row [0, 1, 0], ram-lak, dd = 1:
        //   out[i] = dd * sum_j p[j] h[i-j] = h[i-1]
        let p = Projections::from_parts(arr2(&[[0.0, 1.0, 0.0]]), 1.0, 1.0);
        let filtered = FilteredProjections::new(&p, ReconstructionFilter::RamLak);
        let h = |k: i64| ReconstructionFilter::RamLak.value_at(k, 1.0);
        assert_float_eq!(filtered.data[[0, 0]], h(-1), abs <= 1e-7);
        assert_float_eq!(filtered.data[[0, 1]], h(0),  abs <= 1e-7);
        assert_float_eq!(filtered.data[[0, 2]], h(1),  abs <= 1e-7);
    }

    #[test]
    fn interpolation_returns_exact_samples_and_blends_between() {
        let p = Projections::from_parts(arr2(&[[1.0, 3.0, 5.0]]), 1.0, 1.0);
        let filtered = FilteredProjections::new(&p, ReconstructionFilter::Constant);
        assert_float_eq!(filtered.interpolated(0, 1.0), 3.0, abs <= 1e-6);
        assert_float_eq!(filtered.interpolated(0, 1.5), 4.0, abs <= 1e-6);
        assert_float_eq!(filtered.interpolated(0, -0.1), 0.0, abs <= 1e-6);
        assert_float_eq!(filtered.interpolated(0, 2.5), 0.0, abs <= 1e-6);
    }
}
