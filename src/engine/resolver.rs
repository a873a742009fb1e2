//! Per-particle exp-6 parameters derived from reactive composition.
//!
//! Each particle carries molecule counts for every species at the current and the
//! previous timestep. The two interaction sites configured for the pair style are
//! resolved here, once per particle per force evaluation, into plain
//! `{epsilon, alpha, rm, fraction}` tuples that the pair kernel mixes.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::domain::{Particle, Snapshot, MIN_MOLECULES};
use crate::core::error::{Result, RxError};
use crate::engine::params::PotentialTable;

/// Reserved site name selecting the one-fluid approximation.
pub const ONE_FLUID: &str = "1fluid";

/// `cbrt(rm3)` below this is treated as an empty fluid.
const RM_FLOOR: f64 = 1e-16;

/// Fuchslin powers below this zero the scaled parameter.
const FUCHSLIN_FLOOR: f64 = 1e-15;

/// What an interaction site stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Site {
    /// A single species, by index.
    Species(usize),
    /// Mole-fraction weighted average over every species not pinned to a site.
    OneFluid,
}

impl Site {
    pub fn is_one_fluid(self) -> bool {
        matches!(self, Site::OneFluid)
    }

    /// Resolves a site name against the declared species.
    pub fn from_name(name: &str, species: &[crate::core::domain::Species]) -> Option<Self> {
        if name == ONE_FLUID {
            return Some(Site::OneFluid);
        }
        species.iter().position(|s| s.name == name).map(Site::Species)
    }

    fn pins(self, species: usize) -> bool {
        self == Site::Species(species)
    }
}

/// Power-law exponents applied to the one-fluid `rm` and `epsilon`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fuchslin {
    pub r: f64,
    pub epsilon: f64,
}

/// Scales `value` by `population^exponent`, zeroing it when a negative exponent
/// makes the divisor vanish.
fn fuchslin_scale(value: f64, population: f64, exponent: f64) -> f64 {
    if exponent < 0.0 {
        let power = population.powf(-exponent);
        if power < FUCHSLIN_FLOOR {
            0.0
        } else {
            value / power
        }
    } else {
        value * population.powf(exponent)
    }
}

/// Resolved parameters of one site for one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteParams {
    pub epsilon: f64,
    pub alpha: f64,
    pub rm: f64,
    pub fraction: f64,
}

/// Both sites of one particle for one snapshot.
pub type SitePair = [SiteParams; 2];

/// Everything the kernel needs to know about one particle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedParticle {
    pub current: SitePair,
    pub previous: SitePair,
}

impl ResolvedParticle {
    pub fn snapshot(&self, snapshot: Snapshot) -> &SitePair {
        match snapshot {
            Snapshot::Current => &self.current,
            Snapshot::Previous => &self.previous,
        }
    }
}

/// Dense per-evaluation buffer keyed by particle index (owned and ghost).
#[derive(Debug, Clone, Default)]
pub struct ParamArena {
    entries: Vec<ResolvedParticle>,
}

impl ParamArena {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &ResolvedParticle {
        &self.entries[index]
    }
}

/// Site configuration plus the loaded potential records.
#[derive(Debug, Clone)]
pub struct ReactiveResolver {
    table: PotentialTable,
    sites: [Site; 2],
    fuchslin: Fuchslin,
}

impl ReactiveResolver {
    /// Pinned sites must name a species that has an exp-6 record.
    pub fn new(table: PotentialTable, sites: [Site; 2], fuchslin: Fuchslin) -> Result<Self> {
        for (n, site) in sites.iter().enumerate() {
            if let Site::Species(ispecies) = *site {
                if table.exp6(ispecies).is_none() {
                    return Err(RxError::config(format!(
                        "site{} species index {} has no exp6 record in the potential file",
                        n + 1,
                        ispecies
                    )));
                }
            }
        }
        Ok(Self {
            table,
            sites,
            fuchslin,
        })
    }

    pub fn sites(&self) -> [Site; 2] {
        self.sites
    }

    pub fn fuchslin(&self) -> Fuchslin {
        self.fuchslin
    }

    pub fn table(&self) -> &PotentialTable {
        &self.table
    }

    /// Sites pinned to the same thing contribute only the 12 mix.
    pub fn same_sites(&self) -> bool {
        self.sites[0] == self.sites[1]
    }

    fn uses_one_fluid(&self) -> bool {
        self.sites.iter().any(|s| s.is_one_fluid())
    }

    /// Species that feed the one-fluid average.
    fn in_fluid(&self, species: usize) -> bool {
        self.table.exp6(species).is_some() && !self.sites.iter().any(|s| s.pins(species))
    }

    /// Resolves both snapshots of one particle.
    pub fn resolve(&self, particle: &Particle) -> Result<ResolvedParticle> {
        let width = 2 * self.table.nspecies();
        if particle.composition.len() != width {
            return Err(RxError::config(format!(
                "CG particle {} carries {} composition entries, expected {}",
                particle.tag,
                particle.composition.len(),
                width
            )));
        }

        let current = particle.counts(Snapshot::Current);
        let previous = particle.counts(Snapshot::Previous);

        let n_total: f64 = current.iter().sum();
        let n_total_old: f64 = previous.iter().sum();
        if n_total < MIN_MOLECULES || n_total_old < MIN_MOLECULES {
            return Err(RxError::degenerate(format!(
                "the number of molecules in CG particle {} is less than {} (current {}, previous {})",
                particle.tag, MIN_MOLECULES, n_total, n_total_old
            )));
        }

        Ok(ResolvedParticle {
            current: self.resolve_snapshot(current, n_total),
            previous: self.resolve_snapshot(previous, n_total_old),
        })
    }

    /// Resolves every particle in parallel. The arena is complete when this
    /// returns, before any pair reads it.
    pub fn resolve_all(&self, particles: &[Particle]) -> Result<ParamArena> {
        let entries = particles
            .par_iter()
            .map(|p| self.resolve(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(ParamArena { entries })
    }

    fn resolve_snapshot(&self, counts: &[f64], n_total: f64) -> SitePair {
        let mut resolved = SitePair::default();

        for (slot, site) in resolved.iter_mut().zip(self.sites) {
            if let Site::Species(ispecies) = site {
                if let Some(record) = self.table.exp6(ispecies) {
                    *slot = SiteParams {
                        epsilon: record.epsilon,
                        alpha: record.alpha,
                        rm: record.rm,
                        fraction: counts[ispecies] / n_total,
                    };
                }
            }
        }

        if self.uses_one_fluid() {
            let fluid = self.one_fluid(counts, n_total);
            for (slot, site) in resolved.iter_mut().zip(self.sites) {
                if site.is_one_fluid() {
                    *slot = fluid;
                }
            }
        }

        resolved
    }

    /// One-fluid mixing over the unpinned species, followed by Fuchslin scaling.
    fn one_fluid(&self, counts: &[f64], n_total: f64) -> SiteParams {
        let nspecies = counts.len();
        let n_total_ofa: f64 = (0..nspecies)
            .filter(|&s| self.in_fluid(s))
            .map(|s| counts[s])
            .sum();
        let fraction = n_total_ofa / n_total;

        let mut rm3 = 0.0;
        let mut epsilon = 0.0;
        let mut alpha = 0.0;

        if fraction > 0.0 {
            for i in (0..nspecies).filter(|&s| self.in_fluid(s)) {
                let Some(pi) = self.table.exp6(i) else { continue };
                let x_i = counts[i] / n_total_ofa;

                for j in (0..nspecies).filter(|&s| self.in_fluid(s)) {
                    let Some(pj) = self.table.exp6(j) else { continue };
                    let x_j = counts[j] / n_total_ofa;

                    let rm_ij = 0.5 * (pi.rm + pj.rm);
                    let rm3_ij = rm_ij * rm_ij * rm_ij;
                    let epsilon_ij = (pi.epsilon * pj.epsilon).sqrt();
                    let alpha_ij = (pi.alpha * pj.alpha).sqrt();

                    let weight = x_i * x_j * rm3_ij;
                    rm3 += weight;
                    epsilon += weight * epsilon_ij;
                    alpha += weight * epsilon_ij * alpha_ij;
                }
            }
        }

        let mut params = SiteParams {
            fraction,
            ..SiteParams::default()
        };
        let rm = rm3.cbrt();
        if rm >= RM_FLOOR {
            params.rm = rm;
            params.epsilon = epsilon / rm3;
            params.alpha = alpha / params.epsilon / rm3;
        }

        params.epsilon = fuchslin_scale(params.epsilon, n_total_ofa, self.fuchslin.epsilon);
        params.rm = fuchslin_scale(params.rm, n_total_ofa, self.fuchslin.r);
        params
    }
}
