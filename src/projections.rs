//! The sinogram: accumulated log-attenuation indexed by (angle, distance).

use ndarray::Array2;
use tracing::warn;

use crate::config::ProjectionsProperties;
use crate::{Anglef32, Intensityf32, Lengthf32};

#[derive(Clone, Debug, PartialEq)]
pub struct Projections {
    /// (angle, distance)
    pub data: Array2<Intensityf32>,
    pub angle_resolution: Anglef32,
    pub distance_resolution: Lengthf32,
}

impl Projections {
    pub fn new(props: &ProjectionsProperties) -> Self {
        Self {
            data: Array2::zeros((props.number_of_angles, props.number_of_distances)),
            angle_resolution: props.angle_resolution(),
            distance_resolution: props.distance_resolution(),
        }
    }

    pub fn from_parts(data: Array2<Intensityf32>, angle_resolution: Anglef32, distance_resolution: Lengthf32) -> Self {
        Self { data, angle_resolution, distance_resolution }
    }

    pub fn n_angles(&self)    -> usize { self.data.nrows() }
    pub fn n_distances(&self) -> usize { self.data.ncols() }

    /// Full width of the measuring field covered by the distance axis.
    pub fn distance_range(&self) -> Lengthf32 {
        self.distance_resolution * self.n_distances() as f32
    }

    fn clamp(&self, angle: usize, distance: usize) -> (usize, usize) {
        let a = if angle >= self.n_angles() {
            warn!("angle index {angle} outside sinogram; clamped");
            self.n_angles() - 1
        } else { angle };
        let d = if distance >= self.n_distances() {
            warn!("distance index {distance} outside sinogram; clamped");
            self.n_distances() - 1
        } else { distance };
        (a, d)
    }

    /// Out-of-range indices return the boundary element (and log a warning).
    pub fn value(&self, angle: usize, distance: usize) -> Intensityf32 {
        let (a, d) = self.clamp(angle, distance);
        self.data[[a, d]]
    }

    /// Store one completed gantry frame.
    pub fn set_column(&mut self, angle: usize, column: &[Intensityf32]) {
        let (a, _) = self.clamp(angle, 0);
        let n = column.len().min(self.n_distances());
        if column.len() != self.n_distances() {
            warn!("frame column has {} values, sinogram expects {}", column.len(), self.n_distances());
        }
        for d in 0..n {
            self.data[[a, d]] = column[d];
        }
    }
}
