//! Persisted pair-style state.
//!
//! Layout, all little-endian: `cut_global: f64`, `offset_flag: i32`,
//! `mix_flag: i32`, `tail_flag: i32`, then for every type pair `i <= j` a
//! `setflag: i32` followed by `cut: f64` when the flag is set.

use std::io::{Read, Write};

use crate::core::error::Result;

/// Global settings written ahead of the per-pair table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RestartSettings {
    pub cut_global: f64,
    pub offset_flag: i32,
    pub mix_flag: i32,
    pub tail_flag: i32,
}

pub(crate) fn write_f64<W: Write>(w: &mut W, value: f64) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_i32<W: Write>(w: &mut W, value: i32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_f64<R: Read>(r: &mut R) -> Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

pub(crate) fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

impl RestartSettings {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_f64(w, self.cut_global)?;
        write_i32(w, self.offset_flag)?;
        write_i32(w, self.mix_flag)?;
        write_i32(w, self.tail_flag)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            cut_global: read_f64(r)?,
            offset_flag: read_i32(r)?,
            mix_flag: read_i32(r)?,
            tail_flag: read_i32(r)?,
        })
    }
}
