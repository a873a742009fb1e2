use std::ops::Range;

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::chemistry::CutoffGrid;
use crate::core::domain::{Particle, ParticleSet, SimBox};
use crate::core::error::{Result, RxError};
use crate::core::spatial;
use crate::neighbor::bins::{BinGrid, Stencil, StencilKind};
use crate::neighbor::list::{Neighbor, PagePool, PageWriter, PagedList, RespaLists, WorkerPages};
use crate::neighbor::policy::{
    ExclusionRules, NeighborPolicy, NewtonMode, PairFilter, RespaCutoffs, RespaShells, SearchMethod,
};

/// Neighbor list build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborSettings {
    /// Extra distance added to every pair cutoff.
    pub skin: f64,
    pub policy: NeighborPolicy,
    pub respa: RespaCutoffs,
    /// Entries per storage page.
    pub page_size: usize,
    /// Maximum entries for a single particle.
    pub one_atom: usize,
    /// Worker partitions; defaults to the rayon pool size.
    pub threads: Option<usize>,
    /// Bin edge override; defaults to half the largest neighbor cutoff.
    pub binsize: Option<f64>,
    pub exclusions: ExclusionRules,
}

impl Default for NeighborSettings {
    fn default() -> Self {
        Self {
            skin: 0.3,
            policy: NeighborPolicy::default(),
            respa: RespaCutoffs::default(),
            page_size: 100_000,
            one_atom: 2_000,
            threads: None,
            binsize: None,
            exclusions: ExclusionRules::default(),
        }
    }
}

impl NeighborSettings {
    pub fn validate(&self) -> Result<()> {
        if self.skin < 0.0 {
            return Err(RxError::config("neighbor skin cannot be negative"));
        }
        if self.one_atom == 0 || self.page_size < self.one_atom {
            return Err(RxError::config(format!(
                "neighbor page_size ({}) must be at least one_atom ({}) and one_atom must be positive",
                self.page_size, self.one_atom
            )));
        }
        if let Some(binsize) = self.binsize {
            if !(binsize > 0.0) {
                return Err(RxError::config("neighbor binsize must be positive"));
            }
        }
        if self.threads == Some(0) {
            return Err(RxError::config("neighbor threads must be positive"));
        }
        Ok(())
    }
}

/// Progress of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Unbuilt,
    Binned,
    Scanned,
    Committed,
}

/// Builds full, inner and (optionally) middle lists under one policy.
#[derive(Debug, Clone)]
pub struct NeighborBuilder {
    settings: NeighborSettings,
    cutneigh: CutoffGrid,
    shells: RespaShells,
    stage: BuildStage,
    builds: u64,
}

/// Read-only state shared by all workers of one build.
struct Scan<'a> {
    particles: &'a [Particle],
    nlocal: usize,
    policy: NeighborPolicy,
    cutneigh: &'a CutoffGrid,
    shells: RespaShells,
    filter: PairFilter<'a>,
    binned: Option<(BinGrid, Stencil)>,
    page_size: usize,
    one_atom: usize,
}

/// Writers of one worker, one per list.
struct Writers<'a> {
    full: PageWriter<'a>,
    inner: PageWriter<'a>,
    middle: Option<PageWriter<'a>>,
}

struct Pools {
    full: Mutex<PagePool>,
    inner: Mutex<PagePool>,
    middle: Mutex<PagePool>,
}

impl NeighborBuilder {
    /// `pair_cutoffs` are the force cutoffs; the skin is added here.
    pub fn new(settings: NeighborSettings, pair_cutoffs: &CutoffGrid) -> Result<Self> {
        settings.validate()?;
        let cutneigh = pair_cutoffs.with_skin(settings.skin);
        if !(cutneigh.max_cut() > 0.0) {
            return Err(RxError::config("neighbor cutoff must be positive"));
        }
        let shells = settings.respa.shells(settings.skin);
        Ok(Self {
            settings,
            cutneigh,
            shells,
            stage: BuildStage::Unbuilt,
            builds: 0,
        })
    }

    pub fn settings(&self) -> &NeighborSettings {
        &self.settings
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn cutneigh(&self) -> &CutoffGrid {
        &self.cutneigh
    }

    /// Number of committed builds so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    /// Runs one full build. On failure the builder returns to `Unbuilt`.
    pub fn build(&mut self, system: &ParticleSet, domain: &SimBox) -> Result<RespaLists> {
        self.stage = BuildStage::Unbuilt;
        let result = self.run(system, domain);
        if result.is_err() {
            self.stage = BuildStage::Unbuilt;
        }
        result
    }

    fn run(&mut self, system: &ParticleSet, domain: &SimBox) -> Result<RespaLists> {
        if system.ntypes != self.cutneigh.num_types() {
            return Err(RxError::config(format!(
                "particle set has {} types but cutoffs cover {}",
                system.ntypes,
                self.cutneigh.num_types()
            )));
        }
        let policy = self.settings.policy;
        let cutneighmax = self.cutneigh.max_cut();

        let binned = match policy.search {
            SearchMethod::BruteForce => None,
            SearchMethod::Binned => {
                let binsize = BinGrid::edge_lengths(domain, cutneighmax, self.settings.binsize);
                let grid = BinGrid::build(&system.particles, domain, binsize)?;
                let kind = match policy.newton {
                    NewtonMode::Off => StencilKind::Full,
                    NewtonMode::On => StencilKind::Half,
                    NewtonMode::Triclinic => StencilKind::HalfTriclinic,
                };
                let stencil = Stencil::new(kind, domain, binsize, cutneighmax);
                log::trace!(
                    "binned {} particles into {:?} bins, {:?} stencil of {} offsets",
                    system.nall(),
                    grid.dims(),
                    kind,
                    stencil.len()
                );
                self.stage = BuildStage::Binned;
                Some((grid, stencil))
            }
        };

        let scan = Scan {
            particles: &system.particles,
            nlocal: system.nlocal,
            policy,
            cutneigh: &self.cutneigh,
            shells: self.shells,
            filter: PairFilter::new(&self.settings.exclusions, system.topology.as_ref(), system.ntypes)?,
            binned,
            page_size: self.settings.page_size,
            one_atom: self.settings.one_atom,
        };

        let pools = Pools {
            full: Mutex::new(PagePool::default()),
            inner: Mutex::new(PagePool::default()),
            middle: Mutex::new(PagePool::default()),
        };

        let nthreads = self
            .settings
            .threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1);
        let ranges = partition(system.nlocal, nthreads);

        let outputs = ranges
            .into_par_iter()
            .map(|range| scan.run_range(range, &pools))
            .collect::<Result<Vec<_>>>()?;
        self.stage = BuildStage::Scanned;

        let mut full = Vec::with_capacity(outputs.len());
        let mut inner = Vec::with_capacity(outputs.len());
        let mut middle = Vec::with_capacity(outputs.len());
        for (f, i, m) in outputs {
            full.push(f);
            inner.push(i);
            middle.extend(m);
        }

        let nlocal = system.nlocal;
        let lists = RespaLists {
            full: PagedList::assemble(nlocal, PagePool::claimed(&pools.full), full),
            inner: PagedList::assemble(nlocal, PagePool::claimed(&pools.inner), inner),
            middle: self
                .shells
                .middle_sq
                .map(|_| PagedList::assemble(nlocal, PagePool::claimed(&pools.middle), middle)),
        };

        self.stage = BuildStage::Committed;
        self.builds += 1;
        log::debug!(
            "neighbor build #{} ({:?}/{:?}): {} full, {} inner, {} middle entries over {} owned particles",
            self.builds,
            policy.search,
            policy.newton,
            lists.full.total(),
            lists.inner.total(),
            lists.middle.as_ref().map_or(0, |m| m.total()),
            nlocal
        );
        Ok(lists)
    }
}

/// Splits `0..n` into at most `parts` contiguous ranges.
fn partition(n: usize, parts: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let chunk = (n + parts - 1) / parts;
    (0..n).step_by(chunk).map(|start| start..(start + chunk).min(n)).collect()
}

impl<'a> Scan<'a> {
    fn run_range<'p>(
        &self,
        range: Range<usize>,
        pools: &'p Pools,
    ) -> Result<(WorkerPages, WorkerPages, Option<WorkerPages>)> {
        let mut writers = Writers {
            full: PageWriter::new(&pools.full, "full", self.page_size, self.one_atom),
            inner: PageWriter::new(&pools.inner, "inner", self.page_size, self.one_atom),
            middle: self
                .shells
                .middle_sq
                .map(|_| PageWriter::new(&pools.middle, "middle", self.page_size, self.one_atom)),
        };

        for i in range {
            writers.full.begin(i);
            writers.inner.begin(i);
            if let Some(m) = writers.middle.as_mut() {
                m.begin(i);
            }

            if self.filter.admits(&self.particles[i]) {
                self.scan_particle(i, &mut writers)?;
            }

            writers.full.end();
            writers.inner.end();
            if let Some(m) = writers.middle.as_mut() {
                m.end();
            }
        }

        Ok((
            writers.full.finish(),
            writers.inner.finish(),
            writers.middle.map(PageWriter::finish),
        ))
    }

    fn scan_particle(&self, i: usize, writers: &mut Writers<'_>) -> Result<()> {
        let xi = &self.particles[i].position;

        let Some((grid, stencil)) = &self.binned else {
            for j in i + 1..self.particles.len() {
                if self.policy.keeps_brute(i, j, self.particles, self.nlocal) {
                    self.consider(i, j, writers)?;
                }
            }
            return Ok(());
        };

        let ibin = grid.bin_of(i);
        match self.policy.newton {
            NewtonMode::Off => {
                for &offset in stencil.offsets() {
                    let Some(bin) = grid.shifted(ibin, offset) else { continue };
                    for &j in grid.members(bin) {
                        if j > i {
                            self.consider(i, j, writers)?;
                        }
                    }
                }
            }
            NewtonMode::On => {
                // Owned particles later in the bin are kept as is; ghosts sit at
                // the end of the bin and are kept when above i.
                for &j in grid.rest_of_bin(i) {
                    if j >= self.nlocal && !spatial::is_above_or_level(&self.particles[j].position, xi) {
                        continue;
                    }
                    self.consider(i, j, writers)?;
                }
                for &offset in stencil.offsets() {
                    let Some(bin) = grid.shifted(ibin, offset) else { continue };
                    for &j in grid.members(bin) {
                        self.consider(i, j, writers)?;
                    }
                }
            }
            NewtonMode::Triclinic => {
                for &offset in stencil.offsets() {
                    let Some(bin) = grid.shifted(ibin, offset) else { continue };
                    for &j in grid.members(bin) {
                        if spatial::is_above_strict(&self.particles[j].position, j, xi, i) {
                            self.consider(i, j, writers)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Shared distance, exclusion and shell test for one candidate pair.
    #[inline]
    fn consider(&self, i: usize, j: usize, writers: &mut Writers<'_>) -> Result<()> {
        let pi = &self.particles[i];
        let pj = &self.particles[j];
        if !self.filter.eligible(pi, pj) {
            return Ok(());
        }

        let rsq = spatial::distance_sq(&pi.position, &pj.position);
        if rsq > self.cutneigh.get_cut_sq(pi.type_id, pj.type_id) {
            return Ok(());
        }

        let Some(special) = self.filter.special(i, pj) else {
            return Ok(());
        };
        let entry = Neighbor { index: j, special };

        writers.full.push(entry)?;
        if rsq < self.shells.inner_sq {
            writers.inner.push(entry)?;
        }
        if let (Some(middle), Some((inside_sq, outer_sq))) = (writers.middle.as_mut(), self.shells.middle_sq) {
            if rsq > inside_sq && rsq <= outer_sq {
                middle.push(entry)?;
            }
        }
        Ok(())
    }
}
