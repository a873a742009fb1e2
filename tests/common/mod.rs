#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use exp6_rx::core::domain::{Particle, ParticleSet, SimBox, Species};
use exp6_rx::core::spatial;
use exp6_rx::engine::params::PotentialTable;
use exp6_rx::neighbor::PagedList;
use nalgebra::Point3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Two species: A (alpha 12, epsilon 1, rm 2) and B (alpha 14, epsilon 2, rm 4).
pub const AB_POTENTIAL: &str = "\
# species  kind  alpha  epsilon  rm
A exp6 12.0 1.0 2.0
B exp6 14.0 2.0 4.0
";

pub fn species(names: &[&str]) -> Vec<Species> {
    names.iter().map(|n| Species::new(n)).collect()
}

pub fn species_ab() -> Vec<Species> {
    species(&["A", "B"])
}

pub fn table_ab() -> PotentialTable {
    PotentialTable::parse(Cursor::new(AB_POTENTIAL), &species_ab()).expect("valid potential")
}

static FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Writes `contents` to a fresh file under the system temp directory.
pub fn temp_file(stem: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let n = FILE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("exp6_rx_{}_{}_{}.txt", stem, std::process::id(), n));
    std::fs::write(&path, contents).expect("write temp file");
    path
}

/// Composition with identical current and previous snapshots.
pub fn steady(counts: &[f64]) -> Vec<f64> {
    counts.iter().chain(counts.iter()).copied().collect()
}

pub fn cube(l: f64) -> SimBox {
    SimBox::orthogonal(Point3::origin(), Point3::new(l, l, l)).expect("valid box")
}

/// `n` particles uniformly placed in `domain`, tags `1..=n`, random types.
pub fn random_particles(rng: &mut ChaCha8Rng, n: usize, domain: &SimBox, ntypes: usize) -> Vec<Particle> {
    (0..n)
        .map(|k| {
            let lamda = Point3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
            let position = domain.from_lamda(&lamda);
            let type_id = rng.gen_range(0..ntypes);
            Particle::new(k as u64 + 1, type_id, position, steady(&[1.0, 0.0]))
        })
        .collect()
}

/// Splits `particles` between two processes by `owner`. Each process owns its
/// share and sees every particle of the other process as a ghost.
pub fn split_two(particles: &[Particle], ntypes: usize, owner: impl Fn(&Particle) -> bool) -> [ParticleSet; 2] {
    let build = |mine: bool| {
        let mut set = ParticleSet::new(species_ab(), ntypes);
        for p in particles {
            if owner(p) == mine {
                set.push_owned(p.clone());
            } else {
                set.push_ghost(p.clone());
            }
        }
        set
    };
    [build(true), build(false)]
}

/// Unordered tag pairs within `cut` (inclusive), by exhaustive search.
pub fn brute_tag_pairs(particles: &[Particle], cut: f64) -> BTreeSet<(u64, u64)> {
    let cutsq = cut * cut;
    let mut pairs = BTreeSet::new();
    for (a, pa) in particles.iter().enumerate() {
        for pb in &particles[a + 1..] {
            if spatial::distance_sq(&pa.position, &pb.position) <= cutsq {
                pairs.insert(ordered(pa.tag, pb.tag));
            }
        }
    }
    pairs
}

pub fn ordered(a: u64, b: u64) -> (u64, u64) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// List entries as unordered tag pairs, in list order.
pub fn tag_pairs(set: &ParticleSet, list: &PagedList) -> Vec<(u64, u64)> {
    list.pairs()
        .into_iter()
        .map(|(i, j)| ordered(set.particles[i].tag, set.particles[j].tag))
        .collect()
}

/// Entries whose partner is a ghost.
pub fn ghost_entries(set: &ParticleSet, list: &PagedList) -> usize {
    list.pairs().into_iter().filter(|&(_, j)| j >= set.nlocal).count()
}

pub fn assert_close(a: f64, b: f64, rel: f64) {
    let scale = a.abs().max(b.abs()).max(1e-300);
    assert!(
        (a - b).abs() <= rel * scale,
        "{} and {} differ by more than {:e} (relative)",
        a,
        b,
        rel
    );
}
