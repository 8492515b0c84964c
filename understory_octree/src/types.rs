// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types: vectors, half-open boxes, faces, and octants.

use core::ops::{Add, Mul, Neg, Sub};

use crate::util::sqrt;

/// Coordinate axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The X axis.
    X,
    /// The Y axis.
    Y,
    /// The Z axis.
    Z,
}

impl Axis {
    /// All three axes in `X, Y, Z` order.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    #[inline]
    const fn bit(self) -> u8 {
        match self {
            Self::X => 0b001,
            Self::Y => 0b010,
            Self::Z => 0b100,
        }
    }
}

/// A point or direction in 3D space.
///
/// Plain value type: equality is component-wise and there is no identity.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vector3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Create a vector from its components.
    #[inline(always)]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The component along `axis`.
    #[inline]
    pub const fn get(self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Multiply every component by `factor`.
    #[inline]
    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Squared Euclidean length.
    #[inline]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Euclidean length.
    #[inline]
    pub fn length(self) -> f64 {
        sqrt(self.length_squared())
    }

    /// Unit vector in the same direction.
    ///
    /// The zero vector has no direction and is returned unchanged.
    #[inline]
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            self
        } else {
            self.scale(1.0 / len)
        }
    }

    /// Squared distance between two points.
    #[inline]
    pub fn distance_squared(self, other: Self) -> f64 {
        (self - other).length_squared()
    }

    /// Distance between two points.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }
}

impl Add for Vector3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// One of the six faces of an axis-aligned box.
///
/// Discriminants double as indices into a node's adjacency table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// The face at `min.x`.
    NegX = 0,
    /// The face at `max.x`.
    PosX = 1,
    /// The face at `min.y`.
    NegY = 2,
    /// The face at `max.y`.
    PosY = 3,
    /// The face at `min.z`.
    NegZ = 4,
    /// The face at `max.z`.
    PosZ = 5,
}

impl Face {
    /// All faces in `-X, +X, -Y, +Y, -Z, +Z` order.
    pub const ALL: [Self; 6] = [
        Self::NegX,
        Self::PosX,
        Self::NegY,
        Self::PosY,
        Self::NegZ,
        Self::PosZ,
    ];

    /// The face on the given side of `axis`.
    #[inline]
    pub const fn new(axis: Axis, positive: bool) -> Self {
        match (axis, positive) {
            (Axis::X, false) => Self::NegX,
            (Axis::X, true) => Self::PosX,
            (Axis::Y, false) => Self::NegY,
            (Axis::Y, true) => Self::PosY,
            (Axis::Z, false) => Self::NegZ,
            (Axis::Z, true) => Self::PosZ,
        }
    }

    /// Position of this face in [`Face::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The axis this face is perpendicular to.
    #[inline]
    pub const fn axis(self) -> Axis {
        match self {
            Self::NegX | Self::PosX => Axis::X,
            Self::NegY | Self::PosY => Axis::Y,
            Self::NegZ | Self::PosZ => Axis::Z,
        }
    }

    /// Whether the face looks toward the positive end of its axis.
    #[inline]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::PosX | Self::PosY | Self::PosZ)
    }

    /// The face on the other side of the box.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        Self::new(self.axis(), !self.is_positive())
    }
}

/// One of the eight equal sub-boxes produced by bisecting a box on every axis.
///
/// Named by the sign of each axis relative to the parent's center: bit 0 is
/// set for `+X`, bit 1 for `+Y`, bit 2 for `+Z`. [`Octant::index`] is the slot
/// the child occupies in its parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Octant(u8);

impl Octant {
    /// All octants in index order (`-X-Y-Z` first, `+X+Y+Z` last).
    pub const ALL: [Self; 8] = [
        Self(0),
        Self(1),
        Self(2),
        Self(3),
        Self(4),
        Self(5),
        Self(6),
        Self(7),
    ];

    /// The octant on the given side of each axis.
    #[inline]
    pub const fn new(pos_x: bool, pos_y: bool, pos_z: bool) -> Self {
        Self((pos_x as u8) | ((pos_y as u8) << 1) | ((pos_z as u8) << 2))
    }

    /// Slot of this octant among its siblings.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this octant lies on the positive side of `axis`.
    #[inline]
    pub const fn is_positive(self, axis: Axis) -> bool {
        self.0 & axis.bit() != 0
    }

    /// The sibling mirrored across `axis`.
    #[inline]
    #[must_use]
    pub const fn flip(self, axis: Axis) -> Self {
        Self(self.0 ^ axis.bit())
    }

    /// Whether `face` of this octant lies on its parent's boundary.
    ///
    /// Faces that are not on the boundary are shared with the sibling
    /// returned by [`Octant::flip`] on the face's axis.
    #[inline]
    pub const fn is_outward(self, face: Face) -> bool {
        self.is_positive(face.axis()) == face.is_positive()
    }
}

/// Axis-aligned box `[min.x, max.x) × [min.y, max.y) × [min.z, max.z)`.
///
/// Bounds are half-open so that adjacent regions partition space without
/// overlap. A consequence is that a point lying exactly on the outer `max`
/// of the world region is not contained by any region.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Region {
    /// Inclusive lower corner.
    pub min: Vector3,
    /// Exclusive upper corner.
    pub max: Vector3,
}

impl Region {
    /// Create a region from its corners.
    #[inline(always)]
    pub const fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// Create a region from six scalars in `min_x, max_x, min_y, max_y, min_z, max_z` order.
    #[inline]
    pub const fn from_bounds(bounds: [f64; 6]) -> Self {
        let [min_x, max_x, min_y, max_y, min_z, max_z] = bounds;
        Self::new(
            Vector3::new(min_x, min_y, min_z),
            Vector3::new(max_x, max_y, max_z),
        )
    }

    /// A cube centered on `center` extending `half` along every axis.
    #[inline]
    pub fn cube(center: Vector3, half: f64) -> Self {
        let h = Vector3::new(half, half, half);
        Self::new(center - h, center + h)
    }

    /// Whether `min < max` holds on every axis. Assumes no NaN.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x < self.max.x && self.min.y < self.max.y && self.min.z < self.max.z
    }

    /// Half-open containment test.
    #[inline]
    pub fn contains(&self, p: Vector3) -> bool {
        self.min.x <= p.x
            && p.x < self.max.x
            && self.min.y <= p.y
            && p.y < self.max.y
            && self.min.z <= p.z
            && p.z < self.max.z
    }

    /// Midpoint of every axis.
    #[inline]
    pub fn center(&self) -> Vector3 {
        (self.min + self.max).scale(0.5)
    }

    /// Edge lengths along each axis.
    #[inline]
    pub fn extent(&self) -> Vector3 {
        self.max - self.min
    }

    /// Volume of the region.
    #[inline]
    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    /// The octant of this region that claims `p`.
    ///
    /// Decided purely by comparison with [`Region::center`], so for any `p`
    /// inside the region the returned octant's [`Region::octant_region`]
    /// contains `p`. Points outside are clamped to the nearest octant.
    #[inline]
    pub fn octant_of(&self, p: Vector3) -> Octant {
        let c = self.center();
        Octant::new(p.x >= c.x, p.y >= c.y, p.z >= c.z)
    }

    /// The sub-region covered by `octant`, split at the center of every axis.
    pub fn octant_region(&self, octant: Octant) -> Self {
        let c = self.center();
        let pick = |axis: Axis| {
            if octant.is_positive(axis) {
                (c.get(axis), self.max.get(axis))
            } else {
                (self.min.get(axis), c.get(axis))
            }
        };
        let (min_x, max_x) = pick(Axis::X);
        let (min_y, max_y) = pick(Axis::Y);
        let (min_z, max_z) = pick(Axis::Z);
        Self::new(
            Vector3::new(min_x, min_y, min_z),
            Vector3::new(max_x, max_y, max_z),
        )
    }

    /// Squared distance from `p` to the closest point of the region (zero inside).
    #[inline]
    pub fn distance_squared_to(&self, p: Vector3) -> f64 {
        let nearest = Vector3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        );
        p.distance_squared(nearest)
    }

    /// Whether the interiors of two regions overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
            && self.min.z < other.max.z
            && other.min.z < self.max.z
    }
}
