//! Math types shared between the tracking device and the host renderer, plus the pure pose and
//! matrix derivations used while rendering a frame.

use cgmath::{EuclideanSpace, InnerSpace, Matrix3, SquareMatrix, Zero};

/// A unit quaternion describing an orientation.
pub type Quaternion = cgmath::Quaternion<f32>;

/// A 3-dimensional vector, with (in order) x, y, and z components.
pub type Vector3 = cgmath::Vector3<f32>;

/// A point in 3-dimensional space.
pub type Point3 = cgmath::Point3<f32>;

/// A 4x4 matrix, column-major.
pub type Matrix4 = cgmath::Matrix4<f32>;

/// Orientation and position of a tracked object at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub orientation: Quaternion,
    pub position: Vector3,
}

impl Pose {
    pub fn new(orientation: Quaternion, position: Vector3) -> Pose {
        Pose {
            orientation,
            position,
        }
    }

    pub fn identity() -> Pose {
        Pose::new(Quaternion::new(1.0, 0.0, 0.0, 0.0), Vector3::zero())
    }
}

impl Default for Pose {
    fn default() -> Pose {
        Pose::identity()
    }
}

/// Field of view of a single eye, expressed as the tangents of the half-angles from the view
/// center to each edge.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FovPort {
    pub up_tan: f32,
    pub down_tan: f32,
    pub left_tan: f32,
    pub right_tan: f32,
}

impl FovPort {
    pub fn new(up_tan: f32, down_tan: f32, left_tan: f32, right_tan: f32) -> FovPort {
        FovPort {
            up_tan,
            down_tan,
            left_tan,
            right_tan,
        }
    }

    /// Swap left and right edges, producing the opposite eye's field of view.
    pub fn mirrored(&self) -> FovPort {
        FovPort::new(self.up_tan, self.down_tan, self.right_tan, self.left_tan)
    }
}

/// Size of a surface in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Size {
        Size {
            width,
            height,
        }
    }

    /// Scale both dimensions, truncating toward zero.
    pub fn scaled(&self, factor: f32) -> Size {
        Size::new((self.width as f32 * factor) as u32,
                  (self.height as f32 * factor) as u32)
    }
}

/// A rectangle within a render surface, in pixels from the lower-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Viewport {
        Viewport {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: Size) -> Viewport {
        Viewport::new(0, 0, size.width, size.height)
    }
}

/// Create a right-handed projection matrix for an eye's field of view, with an OpenGL clipping
/// range (-w to w).
pub fn fov_projection(fov: &FovPort, near_z: f32, far_z: f32) -> Matrix4 {
    cgmath::frustum(-fov.left_tan * near_z,
                    fov.right_tan * near_z,
                    -fov.down_tan * near_z,
                    fov.up_tan * near_z,
                    near_z,
                    far_z)
}

/// Derive both eyes' poses from a single head pose. Each offset is the vector from the head
/// center to the eye, in head space.
pub fn calc_eye_poses(head: &Pose, offsets: &[Vector3; 2]) -> [Pose; 2] {
    let eye_pose = |offset: &Vector3| {
        Pose::new(head.orientation, head.position + head.orientation * *offset)
    };
    [eye_pose(&offsets[0]), eye_pose(&offsets[1])]
}

/// Orientation for a camera at `eye` looking toward `target`. The camera looks down its local
/// `-Z` axis with `+Y` up.
///
/// A `target` at `eye` has no direction, so the identity orientation is returned. An `up` parallel
/// to the view direction is replaced with an arbitrary perpendicular, so the camera still faces
/// `target` but its roll is unspecified.
pub fn look_at_orientation(eye: Point3, target: Point3, up: Vector3) -> Quaternion {
    const DEGENERATE: f32 = 1e-12;

    let offset = target - eye;
    if offset.magnitude2() < DEGENERATE {
        return Quaternion::new(1.0, 0.0, 0.0, 0.0);
    }
    let forward = offset.normalize();
    let mut side = forward.cross(up);
    if side.magnitude2() < DEGENERATE {
        let fallback = if forward.x.abs() < 0.9 { Vector3::unit_x() } else { Vector3::unit_y() };
        side = forward.cross(fallback);
    }
    let side = side.normalize();
    let camera_up = side.cross(forward);
    Quaternion::from(Matrix3::from_cols(side, camera_up, -forward))
}

/// World-to-eye view matrix for a tracked eye.
///
/// The eye orientation is composed with the host orientation, the eye is placed at the host eye
/// point (plus the tracked eye position rotated into host space, when positional tracking is
/// usable), and the result is scaled by `1 / head_scale` so the world may be rendered at a
/// different perceived size than tracked space.
pub fn view_matrix(host: &Pose,
                   eye: &Pose,
                   use_eye_position: bool,
                   head_scale: f32) -> Matrix4 {
    let orientation = host.orientation * eye.orientation;
    let up = orientation * Vector3::unit_y();
    let forward = orientation * -Vector3::unit_z();
    let mut eye_point = Point3::from_vec(host.position);
    if use_eye_position {
        eye_point += host.orientation * eye.position;
    }
    Matrix4::look_at_rh(eye_point, eye_point + forward, up) * Matrix4::from_scale(1.0 / head_scale)
}

/// Invert a view matrix, falling back to identity for a degenerate matrix.
pub fn inverse_or_identity(m: &Matrix4) -> Matrix4 {
    m.invert().unwrap_or_else(Matrix4::identity)
}
