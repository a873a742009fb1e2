use std::cmp::Ordering;

use nalgebra::{Point3, Vector3};

use crate::core::domain::SimBox;

/// Calculates the squared distance between two points. Periodic images are
/// explicit ghost particles, so no minimum-image wrapping happens here.
#[inline]
pub fn distance_sq(p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    nalgebra::distance_squared(p1, p2)
}

/// Separation vector `p1 - p2`, the convention pair forces are applied along.
#[inline]
pub fn separation(p1: &Point3<f64>, p2: &Point3<f64>) -> Vector3<f64> {
    p1 - p2
}

/// Orders two points by z, then y, then x.
#[inline]
pub fn cmp_zyx(a: &Point3<f64>, b: &Point3<f64>) -> Ordering {
    a.z.partial_cmp(&b.z)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
        .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
}

/// Ghost tie-break of orthogonal Newton lists: keep `xj` when it is not below
/// `xi` in (z, y, x) order. Coincident points are kept.
#[inline]
pub fn is_above_or_level(xj: &Point3<f64>, xi: &Point3<f64>) -> bool {
    cmp_zyx(xj, xi) != Ordering::Less
}

/// Tie-break of triclinic Newton lists: `j` strictly above `i`, or at the exact
/// same coordinates with a larger index.
#[inline]
pub fn is_above_strict(xj: &Point3<f64>, j: usize, xi: &Point3<f64>, i: usize) -> bool {
    match cmp_zyx(xj, xi) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => j > i,
    }
}

/// Coordinates used for binning: Cartesian offsets from the box origin for
/// orthogonal cells, fractional coordinates for triclinic ones.
#[inline]
pub fn bin_coordinates(domain: &SimBox, p: &Point3<f64>) -> Vector3<f64> {
    if domain.triclinic {
        domain.to_lamda(p).coords
    } else {
        p - domain.origin
    }
}
