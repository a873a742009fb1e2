use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, RxError};
use crate::core::topology::SpecialTopology;

// --- Constants ---

/// Below this many molecules a coarse-grained particle has no physical composition.
pub const MIN_MOLECULES: f64 = 1e-8;

// --- Chemistry Types ---

/// A chemical component tracked by the reaction bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
}

impl Species {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Which half of a particle's composition array is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Snapshot {
    /// Composition at the current timestep (first half).
    Current,
    /// Composition at the previous timestep (second half).
    Previous,
}

// --- The Core Entity ---

fn zero_force() -> Vector3<f64> {
    Vector3::zeros()
}

fn group_all() -> u32 {
    1
}

/// A coarse-grained reactive particle, owned or ghost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    /// Global id, shared by a particle and all of its ghost images.
    pub tag: u64,
    /// Zero-based type index into the pair cutoff tables.
    pub type_id: usize,
    pub position: Point3<f64>,
    /// Group membership bitmask. Bit 0 is the "all" group.
    #[serde(default = "group_all")]
    pub mask: u32,
    #[serde(default)]
    pub molecule: i64,
    /// Molecule counts per species: `[current..., previous...]`, length `2 * nspecies`.
    pub composition: Vec<f64>,
    #[serde(default = "zero_force")]
    pub force: Vector3<f64>,
    /// Work ledger fed by the previous-snapshot energy.
    #[serde(default)]
    pub u_cg: f64,
    /// Forward ledger fed by the current-snapshot energy.
    #[serde(default)]
    pub u_cg_new: f64,
}

impl Particle {
    pub fn new(tag: u64, type_id: usize, position: Point3<f64>, composition: Vec<f64>) -> Self {
        Self {
            tag,
            type_id,
            position,
            mask: group_all(),
            molecule: 0,
            composition,
            force: Vector3::zeros(),
            u_cg: 0.0,
            u_cg_new: 0.0,
        }
    }

    /// Molecule counts for one snapshot.
    pub fn counts(&self, snapshot: Snapshot) -> &[f64] {
        let half = self.composition.len() / 2;
        match snapshot {
            Snapshot::Current => &self.composition[..half],
            Snapshot::Previous => &self.composition[half..],
        }
    }
}

/// Particles visible to one process: owned ones in `[0, nlocal)`, ghosts after.
#[derive(Debug, Clone, Default)]
pub struct ParticleSet {
    pub particles: Vec<Particle>,
    pub nlocal: usize,
    pub ntypes: usize,
    pub species: Vec<Species>,
    /// Bonding topology of the owned particles; `None` for atomic systems.
    pub topology: Option<SpecialTopology>,
}

impl ParticleSet {
    pub fn new(species: Vec<Species>, ntypes: usize) -> Self {
        Self {
            particles: Vec::new(),
            nlocal: 0,
            ntypes,
            species,
            topology: None,
        }
    }

    /// Adds an owned particle, keeping owned particles ahead of ghosts.
    pub fn push_owned(&mut self, particle: Particle) {
        self.particles.insert(self.nlocal, particle);
        self.nlocal += 1;
    }

    pub fn push_ghost(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn nall(&self) -> usize {
        self.particles.len()
    }

    pub fn nghost(&self) -> usize {
        self.particles.len() - self.nlocal
    }

    pub fn nspecies(&self) -> usize {
        self.species.len()
    }

    pub fn is_owned(&self, index: usize) -> bool {
        index < self.nlocal
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s.name == name)
    }

    /// Checks the shape invariants the builders and the kernel rely on.
    pub fn validate(&self) -> Result<()> {
        if self.nlocal > self.particles.len() {
            return Err(RxError::config(format!(
                "nlocal {} exceeds particle count {}",
                self.nlocal,
                self.particles.len()
            )));
        }
        let width = 2 * self.nspecies();
        for (i, p) in self.particles.iter().enumerate() {
            if p.type_id >= self.ntypes {
                return Err(RxError::config(format!(
                    "particle {} (tag {}) has type {} but only {} types exist",
                    i, p.tag, p.type_id, self.ntypes
                )));
            }
            if p.composition.len() != width {
                return Err(RxError::config(format!(
                    "particle {} (tag {}) carries {} composition entries, expected {}",
                    i,
                    p.tag,
                    p.composition.len(),
                    width
                )));
            }
        }
        if let Some(topology) = &self.topology {
            if topology.len() < self.nlocal {
                return Err(RxError::config(format!(
                    "special topology covers {} particles but {} are owned",
                    topology.len(),
                    self.nlocal
                )));
            }
        }
        Ok(())
    }

    /// Zeroes forces and both energy ledgers.
    pub fn reset_accumulators(&mut self) {
        for p in &mut self.particles {
            p.force = Vector3::zeros();
            p.u_cg = 0.0;
            p.u_cg_new = 0.0;
        }
    }
}

// --- Geometry ---

/// Simulation cell. Columns of `cell` are the edge vectors a, b, c; a restricted
/// triclinic cell has a along x and b in the xy plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimBox {
    pub origin: Point3<f64>,
    pub cell: Matrix3<f64>,
    pub inverse: Matrix3<f64>,
    pub triclinic: bool,
}

impl SimBox {
    pub fn orthogonal(lo: Point3<f64>, hi: Point3<f64>) -> Option<Self> {
        let prd = hi - lo;
        Self::build(lo, prd, [0.0; 3], false)
    }

    /// `tilt` is `(xy, xz, yz)`.
    pub fn triclinic(lo: Point3<f64>, hi: Point3<f64>, tilt: [f64; 3]) -> Option<Self> {
        let prd = hi - lo;
        Self::build(lo, prd, tilt, true)
    }

    fn build(lo: Point3<f64>, prd: Vector3<f64>, tilt: [f64; 3], triclinic: bool) -> Option<Self> {
        if prd.iter().any(|&l| !(l > 0.0)) {
            return None;
        }
        let [xy, xz, yz] = tilt;
        let cell = Matrix3::new(
            prd.x, xy, xz, //
            0.0, prd.y, yz, //
            0.0, 0.0, prd.z,
        );
        let inverse = cell.try_inverse()?;
        Some(Self {
            origin: lo,
            cell,
            inverse,
            triclinic,
        })
    }

    /// Cartesian to fractional ("lamda") coordinates.
    pub fn to_lamda(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.inverse * (p - self.origin))
    }

    pub fn from_lamda(&self, lamda: &Point3<f64>) -> Point3<f64> {
        self.origin + self.cell * lamda.coords
    }
}

/// Serialized form of [`SimBox`] used in system description files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxSpec {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
    /// `(xy, xz, yz)`; present only for triclinic cells.
    #[serde(default)]
    pub tilt: Option<[f64; 3]>,
}

impl BoxSpec {
    pub fn build(&self) -> Result<SimBox> {
        let lo = Point3::from(self.lo);
        let hi = Point3::from(self.hi);
        let built = match self.tilt {
            Some(tilt) => SimBox::triclinic(lo, hi, tilt),
            None => SimBox::orthogonal(lo, hi),
        };
        built.ok_or_else(|| RxError::config("simulation box has non-positive extent"))
    }
}
