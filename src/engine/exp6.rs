//! Shifted exp-6 pair potential with a regularized repulsive core.
//!
//! Outside the inner radius the potential is
//! `U(r) = eps/(alpha-6) * (6 exp(alpha (1 - r/rm)) - alpha (rm/r)^6) - urc - durc (r - rc)`,
//! shifted so that value and slope vanish at the cutoff `rc`. Inside `rin` the
//! diverging exp-6 core is replaced by `A / r^12` matched in value and slope.

use crate::core::error::{Result, RxError};
use crate::engine::resolver::SiteParams;

/// Exponent of the inner repulsive wall.
pub const N_REP: i32 = 12;

/// Multiplier on the inner radius estimate.
pub const RIN_SHIFT: f64 = 1.05;

const RIN_A: f64 = 3.7682065;
const RIN_B: f64 = -1.4308614;

/// `exp(value)`, flushed to zero when the argument is below the smallest
/// normal binary exponent.
#[inline]
pub fn exp_value(value: f64) -> f64 {
    if value < f64::MIN_EXP as f64 {
        0.0
    } else {
        value.exp()
    }
}

/// Energy and force of one directed mix at one separation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exp6Eval {
    pub energy: f64,
    /// `-r dU/dr`; divide by `r^2` to get the pair force scalar.
    pub force_r: f64,
}

/// Lorentz-Berthelot mix of two resolved sites.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exp6Mix {
    pub alpha: f64,
    pub epsilon: f64,
    pub rm: f64,
}

impl Exp6Mix {
    pub fn new(alpha: f64, epsilon: f64, rm: f64) -> Self {
        Self { alpha, epsilon, rm }
    }

    pub fn mix(a: &SiteParams, b: &SiteParams) -> Self {
        Self {
            alpha: (a.alpha * b.alpha).sqrt(),
            epsilon: (a.epsilon * b.epsilon).sqrt(),
            rm: 0.5 * (a.rm + b.rm),
        }
    }

    /// A zero `rm` means one side has no fluid to interact with.
    pub fn is_null(&self) -> bool {
        self.rm == 0.0
    }

    /// `alpha == 6` makes the attractive prefactor undefined.
    pub fn check(&self) -> Result<()> {
        if self.alpha == 6.0 {
            return Err(RxError::degenerate("alpha_ij is 6.0 in pair exp6"));
        }
        Ok(())
    }

    /// Radius below which the `r^-12` wall replaces the exp-6 core.
    pub fn inner_radius(&self) -> f64 {
        RIN_SHIFT * self.rm * exp_value(RIN_A + RIN_B * self.alpha.sqrt())
    }

    /// Evaluates the shifted potential at separation `r` for cutoff `rc`.
    /// Callers run [`Exp6Mix::check`] first.
    pub fn evaluate(&self, r: f64, rc: f64) -> Exp6Eval {
        let alpha = self.alpha;
        let rminv = 1.0 / self.rm;
        let buck1 = self.epsilon / (alpha - 6.0);
        let buck2 = 6.0 * alpha;
        let rm6 = self.rm.powi(6);

        let rc_inv = 1.0 / rc;
        let rc6_inv = rc_inv.powi(6);
        let rc_exp = exp_value(alpha * (1.0 - rc * rminv));
        let urc = buck1 * (6.0 * rc_exp - alpha * rm6 * rc6_inv);
        let durc = -buck1 * buck2 * (rc_exp * rminv - rc_inv * rm6 * rc6_inv);

        let rin = self.inner_radius();
        if r < rin {
            let rin6_inv = 1.0 / rin.powi(6);
            let rin_exp = exp_value(alpha * (1.0 - rin * rminv));

            let u_in = buck1 * (6.0 * rin_exp - alpha * rm6 * rin6_inv) - urc - durc * (rin - rc);
            let w_in = -buck1 * buck2 * (rin * rin_exp * rminv - rm6 * rin6_inv) - rin * durc;

            let a_rep = -w_in * rin.powi(N_REP) / N_REP as f64;
            let u_rep_in = a_rep / rin.powi(N_REP);
            let wall = a_rep / r.powi(N_REP);

            Exp6Eval {
                energy: u_in - u_rep_in + wall,
                force_r: N_REP as f64 * wall,
            }
        } else {
            let r6_inv = 1.0 / r.powi(6);
            let r_exp = exp_value(alpha * (1.0 - r * rminv));

            Exp6Eval {
                energy: buck1 * (6.0 * r_exp - alpha * rm6 * r6_inv) - urc - durc * (r - rc),
                force_r: buck1 * buck2 * (r * r_exp * rminv - rm6 * r6_inv) + r * durc,
            }
        }
    }
}

/// Result of combining the directed mixes of one snapshot for one pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairTerm {
    pub energy: f64,
    /// Force scalar: the force on i is `fpair * (x_i - x_j)`.
    pub fpair: f64,
}

/// Both directed mixes of one snapshot, weighted by site fractions.
///
/// Returns `None` when either mix has no fluid (`rm == 0`); such a snapshot
/// contributes nothing to the pair.
pub fn pair_term(
    sites_i: &[SiteParams; 2],
    sites_j: &[SiteParams; 2],
    same_sites: bool,
    r: f64,
    rc: f64,
    factor: f64,
) -> Result<Option<PairTerm>> {
    let mix12 = Exp6Mix::mix(&sites_i[0], &sites_j[1]);
    let mix21 = Exp6Mix::mix(&sites_i[1], &sites_j[0]);
    if mix12.is_null() || mix21.is_null() {
        return Ok(None);
    }
    mix21.check()?;
    mix12.check()?;

    let r2_inv = 1.0 / (r * r);
    let e12 = mix12.evaluate(r, rc);
    let w12 = (sites_i[0].fraction * sites_j[1].fraction).sqrt();

    let (energy, force_r) = if same_sites {
        (w12 * e12.energy, w12 * e12.force_r)
    } else {
        let e21 = mix21.evaluate(r, rc);
        let w21 = (sites_i[1].fraction * sites_j[0].fraction).sqrt();
        (
            w12 * e12.energy + w21 * e21.energy,
            w12 * e12.force_r + w21 * e21.force_r,
        )
    };

    Ok(Some(PairTerm {
        energy: factor * energy,
        fpair: factor * force_r * r2_inv,
    }))
}
