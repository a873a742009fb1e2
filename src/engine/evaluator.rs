use parking_lot::Mutex;
use serde::Serialize;

use crate::core::domain::{ParticleSet, SimBox};
use crate::core::error::Result;
use crate::engine::pair::PairExp6Rx;
use crate::engine::tally::EnergyVirial;
use crate::neighbor::{NeighborBuilder, NeighborSettings};

/// The result of one force evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    /// Global van der Waals energy (previous-snapshot energies, one step behind the forces).
    pub energy: f64,
    /// xx, yy, zz, xy, xz, yz.
    pub virial: [f64; 6],
    /// Entries in the full, inner and middle lists.
    pub list_sizes: [usize; 3],
    /// Sum of `u_cg` and `u_cg_new` over owned particles.
    pub u_cg: f64,
    pub u_cg_new: f64,
}

/// A generic interface for force engines.
/// Implementations must be Thread-Safe (Sync).
pub trait Evaluator: Send + Sync {
    /// Rebuilds neighbor lists, zeroes accumulators and evaluates every pair.
    fn evaluate(&self, system: &mut ParticleSet, domain: &SimBox) -> Result<EvaluationResult>;

    /// Returns the name of the engine.
    fn name(&self) -> &str;
}

/// Pair style plus the neighbor builder that feeds it.
pub struct Exp6RxEvaluator {
    pair: PairExp6Rx,
    builder: Mutex<NeighborBuilder>,
}

impl Exp6RxEvaluator {
    /// Initializes the pair style; fails if any type pair has no coefficients.
    pub fn new(mut pair: PairExp6Rx, settings: NeighborSettings) -> Result<Self> {
        let cutoffs = pair.init()?;
        let builder = NeighborBuilder::new(settings, &cutoffs)?;
        Ok(Self {
            pair,
            builder: Mutex::new(builder),
        })
    }

    pub fn pair(&self) -> &PairExp6Rx {
        &self.pair
    }

    /// Committed neighbor builds so far.
    pub fn builds(&self) -> u64 {
        self.builder.lock().builds()
    }
}

impl Evaluator for Exp6RxEvaluator {
    fn evaluate(&self, system: &mut ParticleSet, domain: &SimBox) -> Result<EvaluationResult> {
        system.validate()?;

        let (lists, newton) = {
            let mut builder = self.builder.lock();
            let newton = builder.settings().policy.newton();
            (builder.build(system, domain)?, newton)
        };

        system.reset_accumulators();
        let tally: EnergyVirial = self.pair.compute(system, &lists.full, newton)?;

        let owned = &system.particles[..system.nlocal];
        Ok(EvaluationResult {
            energy: tally.eng_vdwl,
            virial: tally.virial,
            list_sizes: [
                lists.full.total(),
                lists.inner.total(),
                lists.middle.as_ref().map_or(0, |m| m.total()),
            ],
            u_cg: owned.iter().map(|p| p.u_cg).sum(),
            u_cg_new: owned.iter().map(|p| p.u_cg_new).sum(),
        })
    }

    fn name(&self) -> &str {
        "exp6/rx"
    }
}
