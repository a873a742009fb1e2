//! The `exp6/rx` pair style: configuration, per-type cutoffs, force kernel and
//! persisted state.

use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::chemistry::CutoffGrid;
use crate::core::comm::Communicator;
use crate::core::domain::{ParticleSet, Species};
use crate::core::error::{Result, RxError};
use crate::core::spatial;
use crate::engine::exp6::pair_term;
use crate::engine::params::PotentialTable;
use crate::engine::resolver::{Fuchslin, ReactiveResolver, Site};
use crate::engine::restart::{self, RestartSettings};
use crate::engine::tally::{PairTally, TallySink};
use crate::neighbor::PagedList;

/// Owned particles handled by one pair-evaluation task.
const PAIR_CHUNK: usize = 64;

/// Inclusive 1-based type range in `n`, `*`, `n*`, `*m` or `n*m` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRange {
    pub lo: usize,
    pub hi: usize,
}

impl TypeRange {
    pub fn parse(text: &str, ntypes: usize) -> Result<Self> {
        let bound = |word: &str, default: usize| -> Result<usize> {
            if word.is_empty() {
                return Ok(default);
            }
            word.parse::<usize>()
                .map_err(|_| RxError::config(format!("invalid type range {:?}", text)))
        };

        let (lo, hi) = match text.split_once('*') {
            None => {
                let n = bound(text, 0)?;
                (n, n)
            }
            Some((lo, hi)) => (bound(lo, 1)?, bound(hi, ntypes)?),
        };

        if lo < 1 || hi > ntypes || lo > hi {
            return Err(RxError::config(format!(
                "type range {:?} is out of bounds for {} atom types",
                text, ntypes
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Zero-based indices covered by the range.
    pub fn indices(&self) -> RangeInclusive<usize> {
        self.lo - 1..=self.hi - 1
    }
}

/// One `pair_coeff` line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairCoeff {
    pub types_i: String,
    pub types_j: String,
    pub param_file: PathBuf,
    pub site1: String,
    pub site2: String,
    pub fuchslin_r: f64,
    pub fuchslin_epsilon: f64,
    /// Overrides the global cutoff for the covered pairs.
    #[serde(default)]
    pub cutoff: Option<f64>,
}

/// Exp-6 pair style with composition-dependent site parameters.
#[derive(Debug, Clone)]
pub struct PairExp6Rx {
    ntypes: usize,
    cut_global: f64,
    cut: Vec<f64>,
    setflag: Vec<bool>,
    pub offset_flag: i32,
    pub mix_flag: i32,
    pub tail_flag: i32,
    resolver: Option<ReactiveResolver>,
    cutsq: Option<CutoffGrid>,
}

impl PairExp6Rx {
    pub fn new(ntypes: usize, cut_global: f64) -> Self {
        Self {
            ntypes,
            cut_global,
            cut: vec![0.0; ntypes * ntypes],
            setflag: vec![false; ntypes * ntypes],
            offset_flag: 0,
            mix_flag: 0,
            tail_flag: 0,
            resolver: None,
            cutsq: None,
        }
    }

    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        i * self.ntypes + j
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    pub fn cut_global(&self) -> f64 {
        self.cut_global
    }

    /// Cutoff of zero-based type pair `(i, j)`.
    pub fn cut(&self, i: usize, j: usize) -> f64 {
        self.cut[self.idx(i, j)]
    }

    pub fn is_set(&self, i: usize, j: usize) -> bool {
        self.setflag[self.idx(i, j)]
    }

    pub fn resolver(&self) -> Option<&ReactiveResolver> {
        self.resolver.as_ref()
    }

    /// Sets the global cutoff. Pairs configured earlier take the new value.
    pub fn settings(&mut self, cut_global: f64) -> Result<()> {
        if !(cut_global > 0.0) {
            return Err(RxError::config(format!("illegal global cutoff {}", cut_global)));
        }
        self.cut_global = cut_global;
        for i in 0..self.ntypes {
            for j in i..self.ntypes {
                let k = self.idx(i, j);
                if self.setflag[k] {
                    self.cut[k] = cut_global;
                }
            }
        }
        self.cutsq = None;
        Ok(())
    }

    /// Applies one coefficient line. `species` is the reactive composition
    /// tracker's species list, absent when no tracker is active.
    pub fn configure<C: Communicator + ?Sized>(
        &mut self,
        coeff: &PairCoeff,
        species: Option<&[Species]>,
        comm: &C,
    ) -> Result<()> {
        let species = species.ok_or_else(|| {
            comm.fail(RxError::config(
                "pair exp6/rx requires an active reactive composition tracker",
            ))
        })?;

        let types_i = TypeRange::parse(&coeff.types_i, self.ntypes).map_err(|e| comm.fail(e))?;
        let types_j = TypeRange::parse(&coeff.types_j, self.ntypes).map_err(|e| comm.fail(e))?;

        if species.is_empty() {
            return Err(comm.fail(RxError::config("there are no rx species specified")));
        }

        let table = PotentialTable::read_file(&coeff.param_file, species, comm)?;

        let site = |name: &str, label: &str| {
            Site::from_name(name, species).ok_or_else(|| {
                comm.fail(RxError::config(format!(
                    "{} name {:?} not recognized in pair coefficients",
                    label, name
                )))
            })
        };
        let sites = [site(&coeff.site1, "site1")?, site(&coeff.site2, "site2")?];

        let fuchslin = Fuchslin {
            r: coeff.fuchslin_r,
            epsilon: coeff.fuchslin_epsilon,
        };
        let resolver = ReactiveResolver::new(table, sites, fuchslin).map_err(|e| comm.fail(e))?;

        let cut_one = coeff.cutoff.unwrap_or(self.cut_global);
        if !(cut_one > 0.0) {
            return Err(comm.fail(RxError::config(format!("illegal pair cutoff {}", cut_one))));
        }

        let mut count = 0;
        for i in types_i.indices() {
            for j in types_j.indices().filter(|&j| j >= i) {
                let k = self.idx(i, j);
                self.cut[k] = cut_one;
                self.setflag[k] = true;
                count += 1;
            }
        }
        if count == 0 {
            return Err(comm.fail(RxError::config("incorrect args for pair coefficients")));
        }

        log::info!(
            "exp6/rx coefficients set for {} type pair(s): sites ({}, {}), cutoff {}, fuchslin ({}, {})",
            count,
            coeff.site1,
            coeff.site2,
            cut_one,
            fuchslin.r,
            fuchslin.epsilon
        );
        self.resolver = Some(resolver);
        self.cutsq = None;
        Ok(())
    }

    /// Cutoff of one type pair at setup time, mirrored to `(j, i)`.
    pub fn init_one(&mut self, i: usize, j: usize) -> Result<f64> {
        let k = self.idx(i.min(j), i.max(j));
        if !self.setflag[k] {
            return Err(RxError::config("all pair coeffs are not set"));
        }
        let cut = self.cut[k];
        let mirror = self.idx(j, i);
        self.cut[mirror] = cut;
        Ok(cut)
    }

    /// Validates every type pair and builds the force cutoff grid.
    pub fn init(&mut self) -> Result<CutoffGrid> {
        if self.resolver.is_none() {
            return Err(RxError::config("pair exp6/rx has no coefficients"));
        }
        for i in 0..self.ntypes {
            for j in i..self.ntypes {
                self.init_one(i, j)?;
            }
        }
        let grid = CutoffGrid::new(self.ntypes, 0.0, |i, j| self.cut[i * self.ntypes + j]);
        log::debug!("exp6/rx initialized: max force cutoff {}", grid.max_cut());
        self.cutsq = Some(grid.clone());
        Ok(grid)
    }

    /// Accumulates forces and both energy ledgers for every pair in `list`,
    /// returning the tally of counted pairs.
    ///
    /// Owned particles are processed in fixed chunks whose contributions are
    /// applied in chunk order, so the sums do not depend on thread scheduling.
    pub fn compute<S: TallySink>(
        &self,
        system: &mut ParticleSet,
        list: &PagedList,
        newton: bool,
    ) -> Result<S> {
        system.validate()?;
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| RxError::config("pair exp6/rx has no coefficients"))?;
        let cutsq = self
            .cutsq
            .as_ref()
            .ok_or_else(|| RxError::config("pair exp6/rx used before init"))?;

        let arena = resolver.resolve_all(&system.particles)?;
        let same_sites = resolver.same_sites();
        let factors = system.topology.as_ref().map(|t| t.factors).unwrap_or_default();
        let nlocal = system.nlocal;
        let particles = &system.particles;

        let inum = list.inum();
        let chunks: Vec<(usize, usize)> = (0..inum)
            .step_by(PAIR_CHUNK)
            .map(|start| (start, (start + PAIR_CHUNK).min(inum)))
            .collect();

        let outputs = chunks
            .into_par_iter()
            .map(|(start, end)| -> Result<(Vec<Contribution>, S)> {
                let mut contributions = Vec::new();
                let mut sink = S::default();

                for i in start..end {
                    let pi = &particles[i];
                    let ri = arena.get(i);
                    for entry in list.neighbors(i) {
                        let j = entry.index;
                        let pj = &particles[j];
                        let rsq = spatial::distance_sq(&pi.position, &pj.position);
                        if rsq >= cutsq.get_cut_sq(pi.type_id, pj.type_id) {
                            continue;
                        }

                        let factor = factors.factor(entry.special);
                        let r = rsq.sqrt();
                        let rc = self.cut(pi.type_id, pj.type_id);
                        let rj = arena.get(j);

                        let old = pair_term(&ri.previous, &rj.previous, same_sites, r, rc, factor)?;
                        let new = pair_term(&ri.current, &rj.current, same_sites, r, rc, factor)?;
                        if old.is_none() && new.is_none() {
                            continue;
                        }

                        let e_old = old.map_or(0.0, |t| t.energy);
                        let del = spatial::separation(&pi.position, &pj.position);
                        let (fpair, e_new) = match new {
                            Some(term) => {
                                sink.tally(&PairTally {
                                    i,
                                    j,
                                    nlocal,
                                    newton,
                                    evdwl: e_old,
                                    fpair: term.fpair,
                                    del,
                                });
                                (term.fpair, term.energy)
                            }
                            None => (0.0, 0.0),
                        };

                        contributions.push(Contribution {
                            i,
                            j,
                            force: del * fpair,
                            e_old,
                            e_new,
                        });
                    }
                }
                Ok((contributions, sink))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut total = S::default();
        let mut pairs = 0usize;
        for (contributions, sink) in outputs {
            pairs += contributions.len();
            for c in contributions {
                let pi = &mut system.particles[c.i];
                pi.force += c.force;
                pi.u_cg += 0.5 * c.e_old;
                pi.u_cg_new += 0.5 * c.e_new;
                if newton || c.j < nlocal {
                    let pj = &mut system.particles[c.j];
                    pj.force -= c.force;
                    pj.u_cg += 0.5 * c.e_old;
                    pj.u_cg_new += 0.5 * c.e_new;
                }
            }
            total.merge(sink);
        }

        log::debug!(
            "exp6/rx evaluated {} interacting pairs over {} owned particles (arena of {})",
            pairs,
            inum,
            arena.len()
        );
        Ok(total)
    }

    fn restart_settings(&self) -> RestartSettings {
        RestartSettings {
            cut_global: self.cut_global,
            offset_flag: self.offset_flag,
            mix_flag: self.mix_flag,
            tail_flag: self.tail_flag,
        }
    }

    /// Writes the global settings, then `setflag` and (when set) the cutoff of
    /// every type pair `i <= j`.
    pub fn write_restart<W: Write>(&self, w: &mut W) -> Result<()> {
        self.restart_settings().write(w)?;
        for i in 0..self.ntypes {
            for j in i..self.ntypes {
                let k = self.idx(i, j);
                restart::write_i32(w, self.setflag[k] as i32)?;
                if self.setflag[k] {
                    restart::write_f64(w, self.cut[k])?;
                }
            }
        }
        Ok(())
    }

    /// Restores what [`PairExp6Rx::write_restart`] wrote. Site parameters are
    /// not persisted and come from a fresh `configure`.
    pub fn read_restart<R: Read>(&mut self, r: &mut R) -> Result<()> {
        let settings = RestartSettings::read(r)?;
        self.cut_global = settings.cut_global;
        self.offset_flag = settings.offset_flag;
        self.mix_flag = settings.mix_flag;
        self.tail_flag = settings.tail_flag;

        for i in 0..self.ntypes {
            for j in i..self.ntypes {
                let k = self.idx(i, j);
                self.setflag[k] = restart::read_i32(r)? != 0;
                if self.setflag[k] {
                    self.cut[k] = restart::read_f64(r)?;
                }
            }
        }
        self.cutsq = None;
        Ok(())
    }
}

/// Effect of one pair on its two particles, applied after the parallel pass.
struct Contribution {
    i: usize,
    j: usize,
    force: Vector3<f64>,
    e_old: f64,
    e_new: f64,
}
