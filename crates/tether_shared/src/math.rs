//! Mathematical types shared by both endpoints.
//!
//! These are the canonical representations carried by geometry updates.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - scale, translation, hit points
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit scale
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Number of floats on the wire
    pub const LEN: usize = 3;

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Creates from a slice of exactly three floats
    #[must_use]
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [x, y, z] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }

    /// Component-wise comparison within `epsilon`
    #[must_use]
    pub fn approx_eq(self, other: Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
    }

    /// Smallest absolute component (scale magnitude guide)
    #[must_use]
    pub fn min_abs(self) -> f32 {
        self.x.abs().min(self.y.abs()).min(self.z.abs())
    }

    /// Linear interpolation toward `target`
    #[must_use]
    pub fn lerp(self, target: Self, t: f32) -> Self {
        self + (target - self) * t
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        let d = self - other;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Number of floats on the wire
    pub const LEN: usize = 4;

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }

    /// Creates from a slice of exactly four floats
    #[must_use]
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [x, y, z, w] => Some(Self::new(*x, *y, *z, *w)),
            _ => None,
        }
    }

    /// Comparison within `epsilon`; `q` and `-q` describe the same rotation.
    #[must_use]
    pub fn approx_eq(self, other: Self, epsilon: f32) -> bool {
        let same = (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
            && (self.w - other.w).abs() <= epsilon;
        let flipped = (self.x + other.x).abs() <= epsilon
            && (self.y + other.y).abs() <= epsilon
            && (self.z + other.z).abs() <= epsilon
            && (self.w + other.w).abs() <= epsilon;
        same || flipped
    }

    /// Unit-length copy; identity if the input has no length.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Normalized linear interpolation along the shorter arc.
    #[must_use]
    pub fn nlerp(self, target: Self, t: f32) -> Self {
        let dot = self.x * target.x + self.y * target.y + self.z * target.z + self.w * target.w;
        let target = if dot < 0.0 {
            Self::new(-target.x, -target.y, -target.z, -target.w)
        } else {
            target
        };
        Self::new(
            self.x + (target.x - self.x) * t,
            self.y + (target.y - self.y) * t,
            self.z + (target.z - self.z) * t,
            self.w + (target.w - self.w) * t,
        )
        .normalize()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Transform - scale + rotation + translation, in wire field order
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// Scale
    pub scale: Vec3,
    /// Rotation
    pub rotation: Quaternion,
    /// Translation
    pub translation: Vec3,
}

impl Transform {
    /// Creates a new transform
    #[must_use]
    pub const fn new(scale: Vec3, rotation: Quaternion, translation: Vec3) -> Self {
        Self { scale, rotation, translation }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec3::ONE, Quaternion::IDENTITY, Vec3::ZERO);
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
