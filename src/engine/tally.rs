use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One counted pair as seen by a tally sink.
#[derive(Debug, Clone, Copy)]
pub struct PairTally {
    pub i: usize,
    pub j: usize,
    pub nlocal: usize,
    pub newton: bool,
    pub evdwl: f64,
    pub fpair: f64,
    /// `x_i - x_j`.
    pub del: Vector3<f64>,
}

impl PairTally {
    /// Share of the pair credited to this process: all of it under Newton,
    /// otherwise half per owned partner.
    pub fn weight(&self) -> f64 {
        if self.newton {
            1.0
        } else {
            let mut w = 0.0;
            if self.i < self.nlocal {
                w += 0.5;
            }
            if self.j < self.nlocal {
                w += 0.5;
            }
            w
        }
    }
}

/// Receives every counted pair once. Sinks are filled per worker chunk and then
/// merged in chunk order.
pub trait TallySink: Default + Send {
    fn tally(&mut self, pair: &PairTally);

    fn merge(&mut self, other: Self);
}

/// Global van der Waals energy and virial (xx, yy, zz, xy, xz, yz).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyVirial {
    pub eng_vdwl: f64,
    pub virial: [f64; 6],
}

impl TallySink for EnergyVirial {
    fn tally(&mut self, pair: &PairTally) {
        let w = pair.weight();
        if w == 0.0 {
            return;
        }
        let d = pair.del;
        let f = pair.fpair;
        self.eng_vdwl += w * pair.evdwl;
        self.virial[0] += w * d.x * d.x * f;
        self.virial[1] += w * d.y * d.y * f;
        self.virial[2] += w * d.z * d.z * f;
        self.virial[3] += w * d.x * d.y * f;
        self.virial[4] += w * d.x * d.z * f;
        self.virial[5] += w * d.y * d.z * f;
    }

    fn merge(&mut self, other: Self) {
        self.eng_vdwl += other.eng_vdwl;
        for (a, b) in self.virial.iter_mut().zip(other.virial) {
            *a += b;
        }
    }
}

/// Sink that ignores everything, for evaluations without energy or virial.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTally;

impl TallySink for NoTally {
    fn tally(&mut self, _pair: &PairTally) {}

    fn merge(&mut self, _other: Self) {}
}
