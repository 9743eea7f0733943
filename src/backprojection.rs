//! Backprojection: smearing each filtered sinogram row back across the image.

use ndarray::Array2;
use ordered_float::NotNan;
use rayon::prelude::*;
use tracing::warn;

use crate::filter::FilteredProjections;
use crate::{Intensityf32, Lengthf32};

/// Reconstructed image: a square grid whose pixel size equals the sinogram's
/// distance resolution and whose extent follows the inscribed-square rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Backprojection {
    /// Indexed `[[ix, iy]]`
    pub data: Array2<Intensityf32>,
    pub pixel_size: Lengthf32,
}

impl Backprojection {
    /// Number of image pixels per side: the largest even count whose extent
    /// stays close to the inscribed square `distance_range / sqrt(2)`.
    pub fn side_pixels(filtered: &FilteredProjections) -> usize {
        let side = filtered.distance_range() / std::f32::consts::SQRT_2;
        let half_count = (side / filtered.distance_resolution / 2.0).round() as usize;
        (half_count * 2).max(2)
    }

    pub fn new(filtered: &FilteredProjections) -> Self {
        let dd = filtered.distance_resolution;
        let n = Self::side_pixels(filtered);
        let n_angles = filtered.n_angles();
        let n_distances = filtered.n_distances();
        let weight = std::f32::consts::PI / n_angles as f32;
        let centre_offset = (n_distances as f32 - 1.0) / 2.0;

        // One partial image per thread, summed at the end: angles are
        // independent and the summation order only moves floating-point
        // rounding around.
        let data = (0..n_angles).into_par_iter()
            .fold(|| Array2::zeros((n, n)), |mut image: Array2<Intensityf32>, angle| {
                let theta = angle as f32 * filtered.angle_resolution;
                let (sin, cos) = theta.sin_cos();
                for ix in 0..n {
                    for iy in 0..n {
                        let (x, y) = pixel_centre(n, dd, ix, iy);
                        let t = x * cos + y * sin;
                        let distance_index = t / dd + centre_offset;
                        image[[ix, iy]] += filtered.interpolated(angle, distance_index) * weight;
                    }
                }
                image
            })
            .reduce(|| Array2::zeros((n, n)), |l, r| l + r);

        Self { data, pixel_size: dd }
    }

    pub fn side(&self) -> usize { self.data.nrows() }

    pub fn from_parts(data: Array2<Intensityf32>, pixel_size: Lengthf32) -> Self {
        Self { data, pixel_size }
    }

    /// Physical (x, y) of a pixel centre; the image is centred on the origin.
    pub fn pixel_centre(&self, ix: usize, iy: usize) -> (Lengthf32, Lengthf32) {
        pixel_centre(self.side(), self.pixel_size, ix, iy)
    }

    /// Out-of-range indices return the boundary element (and log a warning).
    pub fn value(&self, ix: usize, iy: usize) -> Intensityf32 {
        let n = self.side();
        if ix >= n || iy >= n {
            warn!("image index ({ix}, {iy}) outside {n}x{n} grid; clamped");
        }
        self.data[[ix.min(n - 1), iy.min(n - 1)]]
    }

    /// Location and value of the brightest pixel.
    pub fn max_pixel(&self) -> ((usize, usize), Intensityf32) {
        self.data.indexed_iter()
            .filter_map(|(idx, &v)| NotNan::new(v).ok().map(|nv| (idx, nv)))
            .max_by_key(|&(_, v)| v)
            .map(|(idx, v)| (idx, v.into_inner()))
            .unwrap_or(((0, 0), 0.0))
    }
}

fn pixel_centre(n: usize, pixel_size: Lengthf32, ix: usize, iy: usize) -> (Lengthf32, Lengthf32) {
    let half = (n as f32 - 1.0) / 2.0;
    ((ix as f32 - half) * pixel_size,
     (iy as f32 - half) * pixel_size)
}
