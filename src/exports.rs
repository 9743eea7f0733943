pub use geometry::{Lengthf32, Line, Point, Vector};
pub use geometry::{FrameId, FrameRegistry, GLOBAL_FRAME};

pub type Energyf32    = f32; // keV
pub type Intensityf32 = f32;
pub type Anglef32     = f32; // radians
pub type Absorptionf32 = f32; // 1/mm

#[allow(non_camel_case_types)] pub type Index3_u = [usize; 3];
#[allow(non_camel_case_types)] pub type BoxDim_u = [usize; 3];

/// Electron rest energy in keV, used by the Compton kinematics.
pub const ELECTRON_REST_ENERGY: Energyf32 = 511.0;

pub const TWOPI: f32 = std::f32::consts::TAU;
