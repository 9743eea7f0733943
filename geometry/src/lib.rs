mod frame;
mod line;
mod surface;
mod voxel;

pub use frame::{CoordinateFrame, FrameError, FrameId, FrameRegistry, GLOBAL_FRAME};
pub use line::Line;
pub use surface::{BoundedSurface, SurfaceHit};
pub use voxel::{ray_box_intersection, BoxIntersection, Face, FaceHit, VoxelBox, FACE_ORDER};

pub type Lengthf32 = f32;

pub type Point  = nalgebra::Point3 <Lengthf32>;
pub type Vector = nalgebra::Vector3<Lengthf32>;
