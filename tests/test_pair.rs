mod common;

use std::io::Cursor;
use std::path::PathBuf;

use common::{assert_close, species_ab, steady, temp_file, AB_POTENTIAL};
use exp6_rx::core::comm::SerialComm;
use exp6_rx::core::domain::{Particle, ParticleSet};
use exp6_rx::engine::evaluator::{Evaluator, Exp6RxEvaluator};
use exp6_rx::engine::exp6::Exp6Mix;
use exp6_rx::engine::pair::{PairCoeff, PairExp6Rx, TypeRange};
use exp6_rx::engine::tally::{EnergyVirial, NoTally};
use exp6_rx::neighbor::{NeighborBuilder, NeighborPolicy, NeighborSettings, NewtonMode, SearchMethod};
use exp6_rx::RxError;
use nalgebra::{Point3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn coeff(types_i: &str, types_j: &str, file: &PathBuf, site1: &str, site2: &str) -> PairCoeff {
    PairCoeff {
        types_i: types_i.to_string(),
        types_j: types_j.to_string(),
        param_file: file.clone(),
        site1: site1.to_string(),
        site2: site2.to_string(),
        fuchslin_r: 0.0,
        fuchslin_epsilon: 0.0,
        cutoff: None,
    }
}

fn configured(ntypes: usize, cut: f64, site1: &str, site2: &str) -> PairExp6Rx {
    let file = temp_file("pair", AB_POTENTIAL);
    let mut pair = PairExp6Rx::new(ntypes, cut);
    pair.configure(&coeff("*", "*", &file, site1, site2), Some(&species_ab()), &SerialComm)
        .unwrap();
    let _ = std::fs::remove_file(file);
    pair
}

fn two_particles(r: f64, first: Vec<f64>, second: Vec<f64>) -> ParticleSet {
    let mut set = ParticleSet::new(species_ab(), 1);
    set.push_owned(Particle::new(1, 0, Point3::new(1.0, 2.0, 2.0), first));
    set.push_owned(Particle::new(2, 0, Point3::new(1.0 + r, 2.0, 2.0), second));
    set
}

fn brute_settings() -> NeighborSettings {
    NeighborSettings {
        policy: NeighborPolicy::new(SearchMethod::BruteForce, NewtonMode::On),
        ..NeighborSettings::default()
    }
}

#[test]
fn test_type_range_forms() {
    assert_eq!(TypeRange::parse("2", 4).unwrap(), TypeRange { lo: 2, hi: 2 });
    assert_eq!(TypeRange::parse("*", 4).unwrap(), TypeRange { lo: 1, hi: 4 });
    assert_eq!(TypeRange::parse("3*", 4).unwrap(), TypeRange { lo: 3, hi: 4 });
    assert_eq!(TypeRange::parse("*2", 4).unwrap(), TypeRange { lo: 1, hi: 2 });
    assert_eq!(TypeRange::parse("2*3", 4).unwrap(), TypeRange { lo: 2, hi: 3 });
    assert_eq!(TypeRange::parse("2*3", 4).unwrap().indices(), 1..=2);

    for bad in ["0", "5", "3*2", "x", "1*9", ""] {
        assert!(
            matches!(TypeRange::parse(bad, 4), Err(RxError::Configuration(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn test_configure_requires_tracker() {
    let file = temp_file("tracker", AB_POTENTIAL);
    let mut pair = PairExp6Rx::new(1, 10.0);

    let err = pair
        .configure(&coeff("*", "*", &file, "A", "A"), None, &SerialComm)
        .unwrap_err();
    assert!(matches!(err, RxError::Configuration(_)));

    let err = pair
        .configure(&coeff("*", "*", &file, "A", "A"), Some(&[][..]), &SerialComm)
        .unwrap_err();
    assert!(matches!(err, RxError::Configuration(_)));
    let _ = std::fs::remove_file(file);
}

#[test]
fn test_configure_rejects_unknown_site() {
    let file = temp_file("site", AB_POTENTIAL);
    let mut pair = PairExp6Rx::new(1, 10.0);
    let err = pair
        .configure(&coeff("1", "1", &file, "A", "H2O"), Some(&species_ab()), &SerialComm)
        .unwrap_err();
    assert!(matches!(err, RxError::Configuration(ref msg) if msg.contains("site2")));
    let _ = std::fs::remove_file(file);
}

#[test]
fn test_configure_propagates_file_errors() {
    let mut pair = PairExp6Rx::new(1, 10.0);
    let missing = PathBuf::from("/nonexistent/exp6_rx.params");
    let err = pair
        .configure(&coeff("1", "1", &missing, "A", "A"), Some(&species_ab()), &SerialComm)
        .unwrap_err();
    assert!(matches!(err, RxError::Io { .. }));

    let bad = temp_file("bad", "A exp6 12.0 -1.0 2.0\n");
    let err = pair
        .configure(&coeff("1", "1", &bad, "A", "A"), Some(&species_ab()), &SerialComm)
        .unwrap_err();
    assert!(matches!(err, RxError::MalformedPotentialFile(_)));
    let _ = std::fs::remove_file(bad);
}

#[test]
fn test_init_requires_every_pair() {
    let file = temp_file("init", AB_POTENTIAL);
    let mut pair = PairExp6Rx::new(3, 8.0);
    pair.configure(&coeff("1", "1*2", &file, "A", "1fluid"), Some(&species_ab()), &SerialComm)
        .unwrap();
    assert!(pair.is_set(0, 0) && pair.is_set(0, 1));
    assert!(!pair.is_set(1, 1));

    let err = pair.init().unwrap_err();
    assert!(matches!(err, RxError::Configuration(ref msg) if msg.contains("not set")));

    let mut late = coeff("2*3", "*", &file, "A", "1fluid");
    late.cutoff = Some(5.0);
    pair.configure(&late, Some(&species_ab()), &SerialComm).unwrap();
    // (3, 1) lies below the diagonal and is filled from (1, 3).
    assert!(!pair.is_set(2, 0));

    let mut rest = coeff("1", "3", &file, "A", "1fluid");
    rest.cutoff = Some(6.0);
    pair.configure(&rest, Some(&species_ab()), &SerialComm).unwrap();

    let grid = pair.init().unwrap();
    assert_eq!(grid.get_cut_sq(0, 1), 64.0);
    assert_eq!(grid.get_cut_sq(2, 0), 36.0);
    assert_eq!(grid.get_cut_sq(1, 2), 25.0);
    assert_eq!(grid.max_cut(), 8.0);
    assert_eq!(pair.cut(2, 1), 5.0);
    let _ = std::fs::remove_file(file);
}

#[test]
fn test_settings_resets_configured_cutoffs() {
    let file = temp_file("settings", AB_POTENTIAL);
    let mut pair = PairExp6Rx::new(2, 10.0);
    let mut c = coeff("1", "1", &file, "A", "A");
    c.cutoff = Some(4.0);
    pair.configure(&c, Some(&species_ab()), &SerialComm).unwrap();
    assert_eq!(pair.cut(0, 0), 4.0);

    pair.settings(7.5).unwrap();
    assert_eq!(pair.cut_global(), 7.5);
    assert_eq!(pair.cut(0, 0), 7.5);
    assert_eq!(pair.cut(1, 1), 0.0);
    assert!(pair.settings(0.0).is_err());
    let _ = std::fs::remove_file(file);
}

#[test]
fn test_restart_round_trip() {
    let file = temp_file("restart", AB_POTENTIAL);
    let mut pair = PairExp6Rx::new(3, 9.0);
    pair.configure(&coeff("1*2", "1*2", &file, "A", "B"), Some(&species_ab()), &SerialComm)
        .unwrap();
    let mut c = coeff("3", "3", &file, "A", "B");
    c.cutoff = Some(3.25);
    pair.configure(&c, Some(&species_ab()), &SerialComm).unwrap();
    pair.offset_flag = 1;
    pair.tail_flag = 1;

    let mut bytes = Vec::new();
    pair.write_restart(&mut bytes).unwrap();
    // Settings block plus 6 flags and 4 cutoffs.
    assert_eq!(bytes.len(), 8 + 3 * 4 + 6 * 4 + 4 * 8);

    let mut restored = PairExp6Rx::new(3, 0.0);
    restored.read_restart(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(restored.cut_global(), 9.0);
    assert_eq!((restored.offset_flag, restored.mix_flag, restored.tail_flag), (1, 0, 1));
    for i in 0..3 {
        for j in i..3 {
            assert_eq!(restored.is_set(i, j), pair.is_set(i, j), "setflag[{i}][{j}]");
            assert_eq!(restored.cut(i, j), pair.cut(i, j), "cut[{i}][{j}]");
        }
    }

    let mut again = Vec::new();
    restored.write_restart(&mut again).unwrap();
    assert_eq!(again, bytes);

    let err = PairExp6Rx::new(3, 0.0)
        .read_restart(&mut Cursor::new(&bytes[..bytes.len() - 3]))
        .unwrap_err();
    assert!(matches!(err, RxError::Restart(_)));
    let _ = std::fs::remove_file(file);
}

#[test]
fn test_pure_a_pair_end_to_end() {
    let pair = configured(1, 10.0, "A", "A");
    let resolved = pair.resolver().unwrap().resolve(&Particle::new(1, 0, Point3::origin(), steady(&[1.0, 0.0]))).unwrap();
    assert_eq!(resolved.current[0].rm, 2.0);
    assert_eq!(resolved.current[0].epsilon, 1.0);
    assert_eq!(resolved.current[0].alpha, 12.0);
    assert_eq!(resolved.current[0].fraction, 1.0);

    let evaluator = Exp6RxEvaluator::new(pair, brute_settings()).unwrap();
    let mut system = two_particles(3.0, steady(&[1.0, 0.0]), steady(&[1.0, 0.0]));
    let result = evaluator.evaluate(&mut system, &common::cube(20.0)).unwrap();

    let expected = Exp6Mix::new(12.0, 1.0, 2.0).evaluate(3.0, 10.0);
    let fpair = expected.force_r / 9.0;

    let f0 = system.particles[0].force;
    let f1 = system.particles[1].force;
    assert!(f0.iter().all(|c| c.is_finite()));
    assert_close(f0.x, -3.0 * fpair, 1e-12);
    assert_eq!((f0.y, f0.z), (0.0, 0.0));
    assert_eq!(f0 + f1, Vector3::zeros());

    assert_close(result.energy, expected.energy, 1e-12);
    assert_close(result.virial[0], 9.0 * fpair, 1e-12);
    assert_eq!(result.list_sizes[0], 1);
    for p in &system.particles {
        assert_close(p.u_cg, 0.5 * expected.energy, 1e-12);
        assert_close(p.u_cg_new, 0.5 * expected.energy, 1e-12);
    }
}

#[test]
fn test_force_uses_current_energy_tally_uses_previous() {
    let pair = configured(1, 10.0, "1fluid", "1fluid");
    let evaluator = Exp6RxEvaluator::new(pair, brute_settings()).unwrap();

    // Pure A now, pure B one step ago.
    let composition = vec![1.0, 0.0, 0.0, 1.0];
    let r = 4.5;
    let mut system = two_particles(r, composition.clone(), composition);
    let result = evaluator.evaluate(&mut system, &common::cube(20.0)).unwrap();

    let now = Exp6Mix::new(12.0, 1.0, 2.0).evaluate(r, 10.0);
    let before = Exp6Mix::new(14.0, 2.0, 4.0).evaluate(r, 10.0);

    assert_close(system.particles[1].force.x, now.force_r / r, 1e-10);
    assert_close(system.particles[0].u_cg_new, 0.5 * now.energy, 1e-10);
    assert_close(system.particles[0].u_cg, 0.5 * before.energy, 1e-10);
    assert_close(result.energy, before.energy, 1e-10);
    assert_close(result.u_cg, before.energy, 1e-10);
}

#[test]
fn test_ghost_partner_without_newton() {
    let pair = configured(1, 10.0, "A", "A");
    let mut settings = brute_settings();
    settings.policy = NeighborPolicy::new(SearchMethod::BruteForce, NewtonMode::Off);
    let evaluator = Exp6RxEvaluator::new(pair, settings).unwrap();

    let mut system = ParticleSet::new(species_ab(), 1);
    system.push_owned(Particle::new(1, 0, Point3::new(5.0, 5.0, 5.0), steady(&[1.0, 0.0])));
    system.push_ghost(Particle::new(2, 0, Point3::new(5.0, 5.0, 8.0), steady(&[1.0, 0.0])));
    let result = evaluator.evaluate(&mut system, &common::cube(20.0)).unwrap();

    let expected = Exp6Mix::new(12.0, 1.0, 2.0).evaluate(3.0, 10.0);
    assert!(system.particles[0].force.z != 0.0);
    assert_eq!(system.particles[1].force, Vector3::zeros());
    assert_eq!(system.particles[1].u_cg, 0.0);
    // Half of the pair belongs to this process.
    assert_close(result.energy, 0.5 * expected.energy, 1e-12);
}

#[test]
fn test_degenerate_composition_aborts_evaluation() {
    let pair = configured(1, 10.0, "A", "1fluid");
    let evaluator = Exp6RxEvaluator::new(pair, brute_settings()).unwrap();
    let mut system = two_particles(3.0, steady(&[1.0, 0.0]), steady(&[0.0, 0.0]));
    let err = evaluator.evaluate(&mut system, &common::cube(20.0)).unwrap_err();
    assert!(matches!(err, RxError::NumericalDegeneracy(_)));
}

fn random_mixture(seed: u64, n: usize, l: f64) -> ParticleSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut set = ParticleSet::new(species_ab(), 2);
    for tag in 1..=n as u64 {
        let position = Point3::new(rng.gen_range(0.0..l), rng.gen_range(0.0..l), rng.gen_range(0.0..l));
        let a = rng.gen_range(0.1..2.0);
        let b = rng.gen_range(0.1..2.0);
        let composition = vec![a, b, a * 0.9, b * 1.1];
        set.push_owned(Particle::new(tag, rng.gen_range(0..2), position, composition));
    }
    set
}

#[test]
fn test_momentum_is_conserved() {
    let pair = configured(2, 4.0, "A", "1fluid");
    let evaluator = Exp6RxEvaluator::new(pair, NeighborSettings::default()).unwrap();
    let mut system = random_mixture(7, 300, 12.0);
    evaluator.evaluate(&mut system, &common::cube(12.0)).unwrap();

    let total: Vector3<f64> = system.particles.iter().map(|p| p.force).sum();
    let scale: f64 = system.particles.iter().map(|p| p.force.norm()).sum();
    assert!(total.norm() <= 1e-10 * scale.max(1.0), "net force {total:?}");
}

#[test]
fn test_compute_is_independent_of_thread_count() {
    let mut pair = configured(2, 4.0, "1fluid", "B");
    let cutoffs = pair.init().unwrap();
    let mut builder = NeighborBuilder::new(NeighborSettings::default(), &cutoffs).unwrap();

    let template = random_mixture(11, 400, 12.0);
    let lists = builder.build(&template, &common::cube(12.0)).unwrap();

    let run = |threads: usize| {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        let mut system = template.clone();
        let tally: EnergyVirial = pool.install(|| pair.compute(&mut system, &lists.full, true)).unwrap();
        (system, tally)
    };

    let (serial, serial_tally) = run(1);
    let (parallel, parallel_tally) = run(4);
    assert_eq!(serial_tally, parallel_tally);
    for (a, b) in serial.particles.iter().zip(&parallel.particles) {
        assert_eq!(a.force, b.force);
        assert_eq!(a.u_cg, b.u_cg);
        assert_eq!(a.u_cg_new, b.u_cg_new);
    }

    let mut untallied = template.clone();
    let _: NoTally = pair.compute(&mut untallied, &lists.full, true).unwrap();
    assert_eq!(untallied.particles[0].force, serial.particles[0].force);
}

#[test]
fn test_compute_rejects_mismatched_composition() {
    let mut pair = configured(1, 10.0, "A", "1fluid");
    let cutoffs = pair.init().unwrap();
    let mut builder = NeighborBuilder::new(brute_settings(), &cutoffs).unwrap();

    let good = two_particles(3.0, steady(&[1.0, 0.0]), steady(&[1.0, 1.0]));
    let lists = builder.build(&good, &common::cube(20.0)).unwrap();

    let mut bad = good.clone();
    bad.particles[1].composition = vec![1.0, 1.0];
    let err = pair.compute::<NoTally>(&mut bad, &lists.full, true).unwrap_err();
    assert!(matches!(err, RxError::Configuration(ref msg) if msg.contains("composition")));
    assert!(bad.particles.iter().all(|p| p.force == Vector3::zeros()));
}
