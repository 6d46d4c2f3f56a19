// Vector and matrix helpers for the coordinate conversions

use std::io;

use worldmesh_shared::util::ByteReader;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Read three little-endian floats
    pub fn read(r: &mut ByteReader) -> Result<Self, io::Error> {
        let x = r.read_f32()?;
        let y = r.read_f32()?;
        let z = r.read_f32()?;
        Ok(Self { x, y, z })
    }
}

/// Row-major 3x3 rotation matrix
pub type Mat3 = [[f32; 3]; 3];

pub const MAT3_IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub fn deg_to_rad(value: f32) -> f32 {
    value * std::f32::consts::PI / 180.0
}

/// Model files store (forward, right, up); the output frame is Y-up.
pub fn fix_coord_system(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

pub fn matrix_rot_x(angle: f32) -> Mat3 {
    let (s, c) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

pub fn matrix_rot_y(angle: f32) -> Mat3 {
    let (s, c) = angle.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

pub fn matrix_rot_z(angle: f32) -> Mat3 {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

pub fn matrix_mul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

pub fn matrix_apply(m: Mat3, v: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

/// Rotation for a placement record, angles in degrees: heading around Y
/// (offset so zero faces north), then Z, then X.
pub fn placement_rotation(rotation: Vec3) -> Mat3 {
    let ry = matrix_rot_y(deg_to_rad(rotation.y - 90.0));
    let rz = matrix_rot_z(deg_to_rad(-rotation.x));
    let rx = matrix_rot_x(deg_to_rad(rotation.z));
    matrix_mul(matrix_mul(ry, rz), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a.x - b.x).abs() < 1e-5, "{:?} != {:?}", a, b);
        assert!((a.y - b.y).abs() < 1e-5, "{:?} != {:?}", a, b);
        assert!((a.z - b.z).abs() < 1e-5, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_identity_mul() {
        let m = matrix_rot_y(0.7);
        let out = matrix_mul(m, MAT3_IDENTITY);
        for i in 0..3 {
            for j in 0..3 {
                assert!((out[i][j] - m[i][j]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_rot_y_quarter_turn() {
        let m = matrix_rot_y(deg_to_rad(90.0));
        assert_close(matrix_apply(m, Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 0.0, -1.0));
        assert_close(matrix_apply(m, Vec3::new(0.0, 1.0, 0.0)), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_fix_coord_system() {
        let v = fix_coord_system(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v, Vec3::new(1.0, 3.0, -2.0));
    }

    #[test]
    fn test_placement_rotation_heading_only() {
        // A rotation of (0, 90, 0) cancels the heading offset
        let m = placement_rotation(Vec3::new(0.0, 90.0, 0.0));
        assert_close(matrix_apply(m, Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_vec3_read() {
        let mut bytes = Vec::new();
        for v in [1.5f32, -2.0, 0.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Vec3::read(&mut r).unwrap(), Vec3::new(1.5, -2.0, 0.25));
    }
}
