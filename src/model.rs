//! Per-voxel attenuation data and the voxelized model grid.

use geometry::VoxelBox;
use tracing::warn;

use crate::spectrum::REFERENCE_ENERGY;
use crate::{Absorptionf32, BoxDim_u, Energyf32, FrameId, Index3_u, Point, Vector};

/// Below this energy the absorption coefficient grows as `(threshold/e)^3`;
/// at and above it the coefficient is constant (keV).
pub const ABSORPTION_ENERGY_THRESHOLD: Energyf32 = REFERENCE_ENERGY;

/// Absorption coefficient at the reference energy plus special-property flags.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VoxelData {
    /// 1/mm at `REFERENCE_ENERGY`
    pub absorption: Absorptionf32,
    pub metal: bool,
    pub undefined: bool,
}

impl VoxelData {
    pub fn new(absorption: Absorptionf32) -> Self {
        Self { absorption, metal: false, undefined: false }
    }

    pub fn metal(absorption: Absorptionf32) -> Self {
        Self { absorption, metal: true, undefined: false }
    }

    /// Rescale the reference coefficient to `energy`. Metal voxels are
    /// additionally scaled by the artifact impact factor, which tunes how
    /// strongly they distort the reconstruction.
    pub fn absorption_at(&self, energy: Energyf32, artifact_factor: f32) -> Absorptionf32 {
        let scale = if energy >= ABSORPTION_ENERGY_THRESHOLD {
            1.0
        } else {
            let r = ABSORPTION_ENERGY_THRESHOLD / energy.max(1.0);
            r * r * r
        };
        let metal_scale = if self.metal { artifact_factor } else { 1.0 };
        self.absorption * scale * metal_scale
    }
}

/// Grid of `VoxelData` centred on the origin of its frame. Voxel geometry is
/// derived on demand; only the payload is mutable after construction.
#[derive(Clone, Debug)]
pub struct VoxelModel {
    pub n: BoxDim_u,
    pub voxel_size: Vector,
    pub frame: FrameId,
    half_width: Vector,
    data: Vec<VoxelData>,
}

impl VoxelModel {
    pub fn new(n: BoxDim_u, voxel_size: Vector, frame: FrameId) -> Self {
        let n = if n.iter().any(|&c| c == 0) {
            warn!("voxel model with a zero dimension {n:?}; falling back to a single voxel");
            [1, 1, 1]
        } else { n };
        let voxel_size = if voxel_size.iter().any(|&s| s <= 0.0) {
            warn!("non-positive voxel size; falling back to 1 mm voxels");
            Vector::new(1.0, 1.0, 1.0)
        } else { voxel_size };
        let half_width = Vector::new(n[0] as f32 * voxel_size.x,
                                     n[1] as f32 * voxel_size.y,
                                     n[2] as f32 * voxel_size.z) / 2.0;
        let data = vec![VoxelData::default(); n[0] * n[1] * n[2]];
        Self { n, voxel_size, frame, half_width, data }
    }

    /// Clamp an index to the grid, logging when it was out of range.
    fn clamp_index(&self, i3: Index3_u) -> Index3_u {
        let mut clamped = i3;
        for axis in 0..3 {
            if clamped[axis] >= self.n[axis] {
                warn!("voxel index {i3:?} outside grid {:?}; clamped to boundary", self.n);
                clamped[axis] = self.n[axis] - 1;
            }
        }
        clamped
    }

    pub fn voxel_data(&self, i3: Index3_u) -> VoxelData {
        self.data[index3_to_1(self.clamp_index(i3), self.n)]
    }

    pub fn voxel_data_mut(&mut self, i3: Index3_u) -> &mut VoxelData {
        let i1 = index3_to_1(self.clamp_index(i3), self.n);
        &mut self.data[i1]
    }

    pub fn set_voxel(&mut self, i3: Index3_u, data: VoxelData) {
        *self.voxel_data_mut(i3) = data;
    }

    pub fn fill_with(&mut self, f: impl Fn(Index3_u) -> VoxelData) {
        for i1 in 0..self.data.len() {
            self.data[i1] = f(index1_to_3(i1, self.n));
        }
    }

    /// Geometry of the voxel at `i3`, in model-frame coordinates.
    pub fn voxel_box(&self, i3: Index3_u) -> VoxelBox {
        let i3 = self.clamp_index(i3);
        let corner = Point::new(i3[0] as f32 * self.voxel_size.x - self.half_width.x,
                                i3[1] as f32 * self.voxel_size.y - self.half_width.y,
                                i3[2] as f32 * self.voxel_size.z - self.half_width.z);
        VoxelBox::new(corner, self.voxel_size)
    }

    /// Bounding box of the whole model, in model-frame coordinates.
    pub fn bounding_box(&self) -> VoxelBox {
        VoxelBox::new(Point::from(-self.half_width), self.half_width * 2.0)
    }

    /// Voxel index containing `p` (model frame), or `None` outside the model.
    pub fn voxel_index_at(&self, p: Point) -> Option<Index3_u> {
        let mut i3 = [0; 3];
        for axis in 0..3 {
            let offset = (p[axis] + self.half_width[axis]) / self.voxel_size[axis];
            if offset < 0.0 { return None; }
            let i = offset as usize;
            if i >= self.n[axis] { return None; }
            i3[axis] = i;
        }
        Some(i3)
    }
}

// --------------------------------------------------------------------------------
//            Flat storage order of the grid: x varies fastest, then y

fn index3_to_1([ix, iy, iz]: Index3_u, [nx, ny, _nz]: BoxDim_u) -> usize {
    ix + nx * (iy + ny * iz)
}

fn index1_to_3(i: usize, [nx, ny, _nz]: BoxDim_u) -> Index3_u {
    [i % nx, (i / nx) % ny, i / (nx * ny)]
}


#[cfg(test)]
mod test_voxel_model {
    use super::*;
    use crate::GLOBAL_FRAME;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn cube_model() -> VoxelModel {
        VoxelModel::new([3, 3, 3], Vector::new(1.0, 1.0, 1.0), GLOBAL_FRAME)
    }

    #[test]
    fn degenerate_construction_falls_back() {
        let m = VoxelModel::new([0, 3, 3], Vector::new(1.0, 0.0, 1.0), GLOBAL_FRAME);
        assert_eq!(m.n, [1, 1, 1]);
        assert_float_eq!(m.voxel_size.x, 1.0, abs <= 1e-6);
    }

    #[test]
    fn out_of_range_access_returns_boundary_voxel() {
        let mut m = cube_model();
        m.set_voxel([2, 2, 2], VoxelData::new(0.5));
        assert_eq!(m.voxel_data([7, 9, 2]), m.voxel_data([2, 2, 2]));
    }

    #[rstest]
    #[case([0, 0, 0], [-1.5, -1.5, -1.5])]
    #[case([1, 1, 1], [-0.5, -0.5, -0.5])]
    #[case([2, 0, 1], [ 0.5, -1.5, -0.5])]
    fn voxel_corners(#[case] i3: Index3_u, #[case] corner: [f32; 3]) {
        let b = cube_model().voxel_box(i3);
        assert_float_eq!([b.corner.x, b.corner.y, b.corner.z], corner, abs <= [1e-6; 3]);
    }

    #[rstest]
    #[case([ 0.0,  0.0,  0.0], Some([1, 1, 1]))]
    #[case([-1.4,  1.4,  0.0], Some([0, 2, 1]))]
    #[case([ 5.0,  0.0,  0.0], None)]
    #[case([ 0.0, -2.0,  0.0], None)]
    fn locating_points(#[case] p: [f32; 3], #[case] expected: Option<Index3_u>) {
        let m = cube_model();
        assert_eq!(m.voxel_index_at(Point::new(p[0], p[1], p[2])), expected);
    }

    #[test]
    fn metal_scaling_applies_only_to_metal() {
        let plain = VoxelData::new(0.02);
        let metal = VoxelData::metal(0.02);
        assert_float_eq!(plain.absorption_at(REFERENCE_ENERGY, 3.0), 0.02, abs <= 1e-8);
        assert_float_eq!(metal.absorption_at(REFERENCE_ENERGY, 3.0), 0.06, abs <= 1e-8);
    }

    #[test]
    fn absorption_constant_above_threshold_and_growing_below() {
        let v = VoxelData::new(0.02);
        assert_float_eq!(v.absorption_at(ABSORPTION_ENERGY_THRESHOLD + 40.0, 1.0), 0.02, abs <= 1e-8);
        assert!(v.absorption_at(ABSORPTION_ENERGY_THRESHOLD / 2.0, 1.0) > 0.02);
    }
}
