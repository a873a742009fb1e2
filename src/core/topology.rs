use serde::{Deserialize, Serialize};

/// Scale factors for bonded neighbors: index 0 is a plain pair, 1..=3 are the
/// 1-2, 1-3 and 1-4 levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecialFactors(pub [f64; 4]);

impl Default for SpecialFactors {
    fn default() -> Self {
        Self([1.0, 0.0, 0.0, 0.0])
    }
}

impl SpecialFactors {
    pub fn new(one_two: f64, one_three: f64, one_four: f64) -> Self {
        Self([1.0, one_two, one_three, one_four])
    }

    #[inline]
    pub fn factor(&self, code: u8) -> f64 {
        self.0[code as usize]
    }
}

/// Tags of a particle's bonded partners, by level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialLists {
    #[serde(default)]
    pub one_two: Vec<u64>,
    #[serde(default)]
    pub one_three: Vec<u64>,
    #[serde(default)]
    pub one_four: Vec<u64>,
}

/// Outcome of checking a candidate pair against the bonding topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialMatch {
    /// Not bonded, or bonded with a factor of exactly 1.
    Plain,
    /// Bonded at this level with a factor strictly between the extremes.
    Scaled(u8),
    /// Bonded with a factor of 0: the pair never enters a list.
    Excluded,
}

impl SpecialMatch {
    /// Code stored next to the partner index, or `None` when the pair is dropped.
    pub fn code(self) -> Option<u8> {
        match self {
            SpecialMatch::Plain => Some(0),
            SpecialMatch::Scaled(level) => Some(level),
            SpecialMatch::Excluded => None,
        }
    }
}

/// Bonding topology lookup for owned particles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecialTopology {
    pub lists: Vec<SpecialLists>,
    #[serde(default)]
    pub factors: SpecialFactors,
}

impl SpecialTopology {
    pub fn new(lists: Vec<SpecialLists>, factors: SpecialFactors) -> Self {
        Self { lists, factors }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Looks up partner `jtag` among the bonded partners of owned particle `i`.
    /// The closest bonding level wins.
    pub fn lookup(&self, i: usize, jtag: u64) -> SpecialMatch {
        let Some(lists) = self.lists.get(i) else {
            return SpecialMatch::Plain;
        };
        let level = if lists.one_two.contains(&jtag) {
            1
        } else if lists.one_three.contains(&jtag) {
            2
        } else if lists.one_four.contains(&jtag) {
            3
        } else {
            return SpecialMatch::Plain;
        };

        let factor = self.factors.factor(level);
        if factor == 0.0 {
            SpecialMatch::Excluded
        } else if factor == 1.0 {
            SpecialMatch::Plain
        } else {
            SpecialMatch::Scaled(level)
        }
    }
}
