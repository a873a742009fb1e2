use serde::{Deserialize, Serialize};

use crate::core::domain::{Particle, SimBox};
use crate::core::error::{Result, RxError};
use crate::core::spatial;
use crate::core::topology::SpecialTopology;

/// How candidate partners are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMethod {
    /// Every later particle, owned and ghost.
    BruteForce,
    /// Particles in stencil bins only.
    Binned,
}

/// Which side of a pair records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewtonMode {
    /// Owned pairs once, owned/ghost pairs on both processes.
    Off,
    /// Every pair exactly once across all processes.
    On,
    /// As `On`, with a coordinate-only tie-break suited to triclinic cells.
    Triclinic,
}

/// Pair-ownership strategy: search method crossed with Newton mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborPolicy {
    pub search: SearchMethod,
    pub newton: NewtonMode,
}

impl Default for NeighborPolicy {
    fn default() -> Self {
        Self {
            search: SearchMethod::Binned,
            newton: NewtonMode::On,
        }
    }
}

impl NeighborPolicy {
    pub fn new(search: SearchMethod, newton: NewtonMode) -> Self {
        Self { search, newton }
    }

    /// Picks the triclinic tie-break automatically for triclinic cells.
    pub fn for_domain(search: SearchMethod, newton: bool, domain: &SimBox) -> Self {
        let newton = match (newton, domain.triclinic) {
            (false, _) => NewtonMode::Off,
            (true, false) => NewtonMode::On,
            (true, true) => NewtonMode::Triclinic,
        };
        Self { search, newton }
    }

    /// Whether forces on ghost partners are applied locally.
    pub fn newton(&self) -> bool {
        self.newton != NewtonMode::Off
    }

    /// Brute-force ownership of pair `(i, j)` with `j > i`.
    pub(crate) fn keeps_brute(&self, i: usize, j: usize, particles: &[Particle], nlocal: usize) -> bool {
        if j < nlocal {
            return true;
        }
        let (pi, pj) = (&particles[i], &particles[j]);
        match self.newton {
            NewtonMode::Off => true,
            NewtonMode::On => {
                let (itag, jtag) = (pi.tag, pj.tag);
                if itag > jtag {
                    (itag + jtag) % 2 == 1
                } else if itag < jtag {
                    (itag + jtag) % 2 == 0
                } else {
                    spatial::is_above_or_level(&pj.position, &pi.position)
                }
            }
            NewtonMode::Triclinic => spatial::is_above_strict(&pj.position, j, &pi.position, i),
        }
    }
}

/// Respa shell boundaries before the skin is added.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RespaCutoffs {
    /// `(lo, hi)` of the inner switching region.
    pub inner: [f64; 2],
    /// `(lo, hi)` of the middle switching region; `None` disables the middle list.
    #[serde(default)]
    pub middle: Option<[f64; 2]>,
}

impl Default for RespaCutoffs {
    fn default() -> Self {
        Self {
            inner: [0.0, 0.0],
            middle: None,
        }
    }
}

/// Squared shell radii actually tested during a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RespaShells {
    pub inner_sq: f64,
    /// `(inside_sq, outer_sq)`: middle entries satisfy `inside < rsq <= outer`.
    pub middle_sq: Option<(f64, f64)>,
}

impl RespaCutoffs {
    pub fn shells(&self, skin: f64) -> RespaShells {
        let inner = self.inner[1] + skin;
        let middle_sq = self.middle.map(|[_, hi]| {
            let inside = (self.inner[0] - skin).max(0.0);
            let outer = hi + skin;
            (inside * inside, outer * outer)
        });
        RespaShells {
            inner_sq: inner * inner,
            middle_sq,
        }
    }
}

/// Pairs that never enter any list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRules {
    /// Only particles in this group are listed, as owners and as partners.
    #[serde(default)]
    pub include_group: Option<u32>,
    /// Zero-based type pairs, either order.
    #[serde(default)]
    pub type_pairs: Vec<(usize, usize)>,
    /// Group bitmask pairs, either order. `(frozen, frozen)` freezes a group.
    #[serde(default)]
    pub group_pairs: Vec<(u32, u32)>,
    /// Groups whose members skip partners from the same molecule.
    #[serde(default)]
    pub molecule_groups: Vec<u32>,
}

/// Exclusion rules and topology lookup folded into one predicate shared by
/// every policy.
pub(crate) struct PairFilter<'a> {
    rules: &'a ExclusionRules,
    topology: Option<&'a SpecialTopology>,
    ntypes: usize,
    type_excluded: Vec<bool>,
}

impl<'a> PairFilter<'a> {
    pub(crate) fn new(
        rules: &'a ExclusionRules,
        topology: Option<&'a SpecialTopology>,
        ntypes: usize,
    ) -> Result<Self> {
        let mut type_excluded = vec![false; ntypes * ntypes];
        for &(a, b) in &rules.type_pairs {
            if a >= ntypes || b >= ntypes {
                return Err(RxError::config(format!(
                    "excluded type pair ({}, {}) outside the {} atom types",
                    a, b, ntypes
                )));
            }
            type_excluded[a * ntypes + b] = true;
            type_excluded[b * ntypes + a] = true;
        }
        Ok(Self {
            rules,
            topology,
            ntypes,
            type_excluded,
        })
    }

    /// Include-group membership.
    #[inline]
    pub(crate) fn admits(&self, p: &Particle) -> bool {
        self.rules.include_group.map_or(true, |group| p.mask & group != 0)
    }

    #[inline]
    fn excluded(&self, pi: &Particle, pj: &Particle) -> bool {
        if self.type_excluded[pi.type_id * self.ntypes + pj.type_id] {
            return true;
        }
        for &(g1, g2) in &self.rules.group_pairs {
            if (pi.mask & g1 != 0 && pj.mask & g2 != 0) || (pi.mask & g2 != 0 && pj.mask & g1 != 0) {
                return true;
            }
        }
        self.rules
            .molecule_groups
            .iter()
            .any(|&g| pi.mask & g != 0 && pj.mask & g != 0 && pi.molecule == pj.molecule)
    }

    /// Passes the non-geometric tests for a candidate partner.
    #[inline]
    pub(crate) fn eligible(&self, pi: &Particle, pj: &Particle) -> bool {
        self.admits(pj) && !self.excluded(pi, pj)
    }

    /// Topology code for a pair within cutoff; `None` drops it.
    #[inline]
    pub(crate) fn special(&self, i: usize, pj: &Particle) -> Option<u8> {
        match self.topology {
            Some(topology) => topology.lookup(i, pj.tag).code(),
            None => Some(0),
        }
    }
}
