//! Uniform spatial binning and bin stencils.
//!
//! Bin indices are computed from coordinates relative to the simulation box
//! origin (fractional coordinates for triclinic cells), so processes sharing a
//! box share the bin lattice and agree on stencil directions.

use nalgebra::Vector3;

use crate::core::domain::{Particle, SimBox};
use crate::core::error::{Result, RxError};
use crate::core::spatial;

/// Largest dense grid a build may allocate.
pub const MAX_BINS: usize = 1 << 24;

/// Owned-then-ghost membership of every bin.
#[derive(Debug, Clone)]
pub struct BinGrid {
    binsize: Vector3<f64>,
    lo: [i64; 3],
    dims: [usize; 3],
    bins: Vec<Vec<usize>>,
    atom_bin: Vec<usize>,
    slot: Vec<usize>,
}

impl BinGrid {
    /// Bin edge lengths in binning coordinates for a given neighbor cutoff.
    /// `binsize` overrides the default of half the cutoff.
    pub fn edge_lengths(domain: &SimBox, cutneighmax: f64, binsize: Option<f64>) -> Vector3<f64> {
        let edge = binsize.unwrap_or(0.5 * cutneighmax);
        if domain.triclinic {
            // Width of a Cartesian length `edge` along each fractional axis.
            Vector3::from_fn(|d, _| edge * domain.inverse.row(d).norm())
        } else {
            Vector3::repeat(edge)
        }
    }

    /// Bins every particle (owned first, then ghosts, each ascending).
    ///
    /// Fails when the occupied extent needs more than [`MAX_BINS`] bins, which
    /// happens with a stray far-away particle or a tiny bin size.
    pub fn build(particles: &[Particle], domain: &SimBox, binsize: Vector3<f64>) -> Result<Self> {
        let coords: Vec<[i64; 3]> = particles
            .iter()
            .map(|p| {
                let c = spatial::bin_coordinates(domain, &p.position);
                [
                    (c.x / binsize.x).floor() as i64,
                    (c.y / binsize.y).floor() as i64,
                    (c.z / binsize.z).floor() as i64,
                ]
            })
            .collect();

        let mut lo = [0i64; 3];
        let mut dims = [0usize; 3];
        if !coords.is_empty() {
            for d in 0..3 {
                let min = coords.iter().map(|c| c[d]).min().unwrap_or(0);
                let max = coords.iter().map(|c| c[d]).max().unwrap_or(0);
                lo[d] = min;
                dims[d] = usize::try_from(max.abs_diff(min))
                    .ok()
                    .and_then(|span| span.checked_add(1))
                    .ok_or_else(|| too_many_bins(binsize))?;
            }
        }

        let nbins = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .filter(|&n| n <= MAX_BINS)
            .ok_or_else(|| too_many_bins(binsize))?;
        let mut bins: Vec<Vec<usize>> = vec![Vec::new(); nbins];
        let mut atom_bin = Vec::with_capacity(particles.len());
        let mut slot = Vec::with_capacity(particles.len());

        for (i, c) in coords.iter().enumerate() {
            let bin = Self::flat(&dims, [
                (c[0] - lo[0]) as usize,
                (c[1] - lo[1]) as usize,
                (c[2] - lo[2]) as usize,
            ]);
            slot.push(bins[bin].len());
            bins[bin].push(i);
            atom_bin.push(bin);
        }

        Ok(Self {
            binsize,
            lo,
            dims,
            bins,
            atom_bin,
            slot,
        })
    }

    #[inline]
    fn flat(dims: &[usize; 3], idx: [usize; 3]) -> usize {
        (idx[2] * dims[1] + idx[1]) * dims[0] + idx[0]
    }

    #[inline]
    fn unflat(&self, bin: usize) -> [usize; 3] {
        let x = bin % self.dims[0];
        let y = (bin / self.dims[0]) % self.dims[1];
        let z = bin / (self.dims[0] * self.dims[1]);
        [x, y, z]
    }

    pub fn binsize(&self) -> Vector3<f64> {
        self.binsize
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Global index of the lowest occupied bin along each axis.
    pub fn origin_index(&self) -> [i64; 3] {
        self.lo
    }

    pub fn nbins(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn bin_of(&self, i: usize) -> usize {
        self.atom_bin[i]
    }

    #[inline]
    pub fn members(&self, bin: usize) -> &[usize] {
        &self.bins[bin]
    }

    /// Particles stored after `i` in its own bin.
    #[inline]
    pub fn rest_of_bin(&self, i: usize) -> &[usize] {
        &self.bins[self.atom_bin[i]][self.slot[i] + 1..]
    }

    /// Bin reached from `bin` by `offset`, if it lies on the grid.
    #[inline]
    pub fn shifted(&self, bin: usize, offset: [i64; 3]) -> Option<usize> {
        let base = self.unflat(bin);
        let mut idx = [0usize; 3];
        for d in 0..3 {
            let v = base[d] as i64 + offset[d];
            if v < 0 || v >= self.dims[d] as i64 {
                return None;
            }
            idx[d] = v as usize;
        }
        Some(Self::flat(&self.dims, idx))
    }
}

/// Which offsets a stencil keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilKind {
    /// Every bin in reach, own bin included.
    Full,
    /// Upper half in (z, y, x) bin order, own bin excluded.
    Half,
    /// Every bin with a non-negative z offset, own bin included.
    HalfTriclinic,
}

/// Bin offsets guaranteed to cover the neighbor cutoff.
#[derive(Debug, Clone)]
pub struct Stencil {
    kind: StencilKind,
    offsets: Vec<[i64; 3]>,
}

/// Squared minimum distance between two bins `k` apart along one axis.
fn bin_gap(k: i64, binsize: f64) -> f64 {
    let gap = match k {
        k if k > 0 => (k - 1) as f64 * binsize,
        0 => 0.0,
        k => (k + 1) as f64 * binsize,
    };
    gap * gap
}

impl Stencil {
    pub fn new(kind: StencilKind, domain: &SimBox, binsize: Vector3<f64>, cutneighmax: f64) -> Self {
        let reach: [i64; 3] = std::array::from_fn(|d| {
            let extent = if domain.triclinic {
                cutneighmax * domain.inverse.row(d).norm()
            } else {
                cutneighmax
            };
            (extent / binsize[d]).floor() as i64 + 1
        });
        let cutsq = cutneighmax * cutneighmax;

        let mut offsets = Vec::new();
        for k in -reach[2]..=reach[2] {
            for j in -reach[1]..=reach[1] {
                for i in -reach[0]..=reach[0] {
                    let keep = match kind {
                        StencilKind::Full => true,
                        StencilKind::Half => k > 0 || (k == 0 && j > 0) || (k == 0 && j == 0 && i > 0),
                        StencilKind::HalfTriclinic => k >= 0,
                    };
                    if !keep {
                        continue;
                    }
                    // Fractional bins have no simple Cartesian gap; keep them all.
                    if !domain.triclinic {
                        let gap = bin_gap(i, binsize.x) + bin_gap(j, binsize.y) + bin_gap(k, binsize.z);
                        if gap > cutsq {
                            continue;
                        }
                    }
                    offsets.push([i, j, k]);
                }
            }
        }

        Self { kind, offsets }
    }

    pub fn kind(&self) -> StencilKind {
        self.kind
    }

    pub fn offsets(&self) -> &[[i64; 3]] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

fn too_many_bins(binsize: Vector3<f64>) -> RxError {
    RxError::config(format!(
        "too many neighbor bins (limit {}) for bin size {:?}; check for particles far outside the box",
        MAX_BINS,
        binsize.as_slice()
    ))
}
