use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::comm::Communicator;
use crate::core::domain::Species;
use crate::core::error::{Result, RxError};

/// Tokens in one logical record: `<species> <kind> <alpha> <epsilon> <rm>`.
const PARAMS_PER_RECORD: usize = 5;

/// Interaction forms a record can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PotentialKind {
    Exp6,
}

impl PotentialKind {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "exp6" => Some(PotentialKind::Exp6),
            _ => None,
        }
    }
}

/// One species' exp-6 parameters as read from the potential file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialParamSet {
    pub species: usize,
    pub name: String,
    pub kind: PotentialKind,
    /// Repulsion steepness.
    pub alpha: f64,
    /// Well depth.
    pub epsilon: f64,
    /// Equilibrium separation.
    pub rm: f64,
}

/// Loaded records plus the species -> record map.
#[derive(Debug, Clone, Default)]
pub struct PotentialTable {
    records: Vec<PotentialParamSet>,
    by_species: Vec<Option<usize>>,
}

impl PotentialTable {
    /// Builds the table, rejecting a species that appears in more than one record.
    pub fn new(records: Vec<PotentialParamSet>, nspecies: usize) -> Result<Self> {
        let mut by_species = vec![None; nspecies];
        for (index, record) in records.iter().enumerate() {
            let slot = by_species.get_mut(record.species).ok_or_else(|| {
                RxError::malformed(format!(
                    "record for species index {} outside the {} declared species",
                    record.species, nspecies
                ))
            })?;
            if slot.is_some() {
                return Err(RxError::malformed(format!(
                    "potential file has duplicate entry for species {}",
                    record.name
                )));
            }
            *slot = Some(index);
        }
        Ok(Self {
            records,
            by_species,
        })
    }

    /// Parses records from an in-memory or on-disk reader.
    pub fn parse<R: BufRead>(reader: R, species: &[Species]) -> Result<Self> {
        let mut lines = reader.lines();
        let records = parse_records(
            || {
                lines
                    .next()
                    .transpose()
                    .map_err(|e| RxError::malformed(format!("cannot read line: {}", e)))
            },
            species,
        )?;
        Self::new(records, species.len())
    }

    /// Reads `path` on the root process and broadcasts its lines to all ranks.
    /// A missing or unreadable file is reported by the root alone.
    pub fn read_file<C: Communicator + ?Sized>(
        path: &Path,
        species: &[Species],
        comm: &C,
    ) -> Result<Self> {
        let mut reader = if comm.is_root() {
            match File::open(path) {
                Ok(file) => Some(BufReader::new(file).lines()),
                Err(source) => {
                    return Err(comm.fail(RxError::Io {
                        path: path.to_path_buf(),
                        source,
                    }))
                }
            }
        } else {
            None
        };

        // A read failure is seen by the root alone.
        let next_line = || {
            let line = match reader.as_mut().and_then(|lines| lines.next()) {
                Some(Ok(line)) => Some(line),
                Some(Err(source)) => {
                    return Err(RxError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
                None => None,
            };
            Ok(comm.broadcast_line(line))
        };

        let table = parse_records(next_line, species)
            .and_then(|records| Self::new(records, species.len()))
            .map_err(|e| comm.fail(e))?;

        log::info!(
            "loaded {} exp6/rx records from {}",
            table.records.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn records(&self) -> &[PotentialParamSet] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn nspecies(&self) -> usize {
        self.by_species.len()
    }

    /// Exp-6 record for `species`, if the file provided one.
    #[inline]
    pub fn exp6(&self, species: usize) -> Option<&PotentialParamSet> {
        self.by_species
            .get(species)
            .copied()
            .flatten()
            .map(|index| &self.records[index])
            .filter(|record| record.kind == PotentialKind::Exp6)
    }
}

/// Drops everything from the first `#` on.
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Core of the potential file grammar. `next_line` yields physical lines until
/// the input is exhausted; a read error ends the parse with that error.
fn parse_records<F>(mut next_line: F, species: &[Species]) -> Result<Vec<PotentialParamSet>>
where
    F: FnMut() -> Result<Option<String>>,
{
    let mut records = Vec::new();

    while let Some(line) = next_line()? {
        let mut words: Vec<String> = strip_comment(&line)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            continue;
        }

        // One record can span multiple lines.
        while words.len() < PARAMS_PER_RECORD {
            match next_line()? {
                Some(more) => words.extend(strip_comment(&more).split_whitespace().map(str::to_string)),
                None => break,
            }
        }

        if words.len() != PARAMS_PER_RECORD {
            return Err(RxError::malformed(format!(
                "expected {} words per record, found {}: {:?}",
                PARAMS_PER_RECORD,
                words.len(),
                words
            )));
        }

        let Some(ispecies) = species.iter().position(|s| s.name == words[0]) else {
            log::warn!("skipping potential record for undeclared species {}", words[0]);
            continue;
        };

        let kind = PotentialKind::parse(&words[1]).ok_or_else(|| {
            RxError::malformed(format!("interaction potential {} does not exist", words[1]))
        })?;

        let alpha = parse_number(&words[2], "alpha")?;
        let epsilon = parse_number(&words[3], "epsilon")?;
        let rm = parse_number(&words[4], "rm")?;
        let finite = alpha.is_finite() && epsilon.is_finite() && rm.is_finite();
        if !finite || !(epsilon > 0.0 && rm > 0.0 && alpha >= 0.0) {
            return Err(RxError::malformed(format!(
                "illegal parameters for {}: rm and epsilon must be finite and greater than zero, alpha must be finite \
                 and cannot be negative (alpha={}, epsilon={}, rm={})",
                words[0], alpha, epsilon, rm
            )));
        }

        records.push(PotentialParamSet {
            species: ispecies,
            name: species[ispecies].name.clone(),
            kind,
            alpha,
            epsilon,
            rm,
        });
    }

    Ok(records)
}

fn parse_number(word: &str, field: &str) -> Result<f64> {
    word.parse::<f64>()
        .map_err(|_| RxError::malformed(format!("cannot parse {} value {:?}", field, word)))
}
