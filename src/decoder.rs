use log::{debug, warn};
use serde::Serialize;

use crate::bitfield::{self, DATAFLOW, LAUNCH, WORKLOAD};
use crate::config::Config;
use crate::error::{PimError, Result};
use crate::occupancy::BankOccupancy;
use crate::partition::{DataflowConfig, PartitionTable};
use crate::scheduler;

/// Largest cut count the 4-bit workload cut field can address
pub const MAX_CUTS: usize = 16;

/// Which per-cut scalar a workload instruction overwrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadType {
  /// M and the weight base row
  Weight,
  /// K and the output base row
  Output,
  /// N and the input base row
  Input,
}

impl TryFrom<u64> for LoadType {
  type Error = PimError;

  fn try_from(value: u64) -> Result<Self> {
    match value {
      0 => Ok(LoadType::Weight),
      1 => Ok(LoadType::Output),
      2 => Ok(LoadType::Input),
      other => Err(PimError::UnknownLoadType(other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
  Launch { mask: u64 },
  Dataflow(DataflowConfig),
  Workload { cut: usize, load: LoadType, dim: u64, base_row: u64 },
}

/// Result of applying one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
  Reconfigured(DataflowConfig),
  Loaded { cut: usize, load: LoadType, dim: u64 },
  /// cuts armed by a launch, possibly none
  Launched(Vec<usize>),
  /// instruction aimed at a running or incomplete cut, stays pending
  Retry,
}

pub fn is_launch(word: u64) -> bool {
  word & 1 == 1
}

pub fn is_dataflow(word: u64) -> bool {
  !is_launch(word) && (word >> 5) & 0b11 == 0b11
}

/// Classify and unpack an instruction word
pub fn decode(word: u64, config: &Config) -> Result<Instruction> {
  if is_launch(word) {
    let fields = bitfield::unpack(word, LAUNCH);
    return Ok(Instruction::Launch {
      mask: fields.get("cut_mask"),
    });
  }

  if is_dataflow(word) {
    let f = bitfield::unpack(word, DATAFLOW);
    let tile_m = 1u64 << f.get("tile_m_log2");
    if tile_m > config.pim.max_tile_m {
      return Err(PimError::OversizedTile {
        tile: tile_m,
        max: config.pim.max_tile_m,
      });
    }
    let df = DataflowConfig {
      vcuts: 1 << f.get("vcuts_log2"),
      hcuts: 1 << f.get("hcuts_log2"),
      mcf: 1 << f.get("mcf_log2"),
      ucf: 1 << f.get("ucf_log2"),
      dataflow: f.get("dataflow") as u8,
      tile_m: tile_m as usize,
      vcuts_next: 1 << f.get("vcuts_next_log2"),
      hcuts_next: 1 << f.get("hcuts_next_log2"),
      kernel_size: f.get("kernel_size") as usize,
      stride: f.get("stride") as usize,
    };
    check_cuts(&df, config)?;
    return Ok(Instruction::Dataflow(df));
  }

  let f = bitfield::unpack(word, WORKLOAD);
  Ok(Instruction::Workload {
    cut: f.get("cut") as usize,
    load: LoadType::try_from(f.get("load_type"))?,
    dim: f.get("dim"),
    base_row: f.get("base_row"),
  })
}

fn check_cuts(df: &DataflowConfig, config: &Config) -> Result<()> {
  let invalid = |reason: &str| PimError::InvalidCuts {
    vcuts: df.vcuts,
    hcuts: df.hcuts,
    reason: reason.to_string(),
  };
  if config.banks() % df.vcuts != 0 {
    return Err(invalid("vcuts must divide the banks of a channel"));
  }
  if config.channels() % df.hcuts != 0 {
    return Err(invalid("hcuts must divide the channel count"));
  }
  if df.cuts() > MAX_CUTS {
    return Err(invalid("more cuts than the workload cut field can address"));
  }
  Ok(())
}

/// Apply a decoded instruction to the cut table.
///
/// Reconfiguration resets every cut, so held banks are handed back first.
/// Workload loads and launches aimed at a running cut wait for it to finish.
pub fn apply(
  inst: &Instruction,
  word: u64,
  table: &mut PartitionTable,
  occupancy: &mut BankOccupancy,
  config: &Config,
) -> Result<Decoded> {
  match *inst {
    Instruction::Dataflow(df) => {
      scheduler::release_all(table, occupancy)?;
      table.reconfigure(df, config);
      debug!("dataflow {:?}: {} cuts", df, df.cuts());
      Ok(Decoded::Reconfigured(df))
    }

    Instruction::Workload {
      cut,
      load,
      dim,
      base_row,
    } => {
      if table.dataflow().is_none() {
        return Err(PimError::NotConfigured(word));
      }
      let rows = config.dram.rows as u64;
      if base_row >= rows {
        return Err(PimError::RowOutOfRange { row: base_row, rows });
      }
      let cuts = table.len();
      let part = table.get_mut(cut).ok_or(PimError::CutOutOfRange { cut, cuts })?;
      // the running cut derives its tile shape from these scalars
      if part.active {
        return Ok(Decoded::Retry);
      }
      let w = &mut part.workload;
      match load {
        LoadType::Weight => {
          w.m = dim;
          w.base_row_w = base_row;
        }
        LoadType::Output => {
          w.k = dim;
          w.base_row_out = base_row;
        }
        LoadType::Input => {
          w.n = dim;
          w.base_row_in = base_row;
        }
      }
      debug!("cut {} {:?} dim={} base_row={:#x}", cut, load, dim, base_row);
      Ok(Decoded::Loaded { cut, load, dim })
    }

    Instruction::Launch { mask } => {
      let cuts = table.len();
      let live = if cuts >= 64 { mask } else { mask & ((1u64 << cuts) - 1) };
      if live != mask {
        warn!("launch mask {:#x} names cuts beyond the {} configured", mask, cuts);
      }
      let masked: Vec<usize> = (0..cuts).filter(|cut| live >> cut & 1 == 1).collect();

      let ready = masked
        .iter()
        .all(|&cut| table.get(cut).is_some_and(|p| p.workload.is_populated() && !p.active));
      if !ready {
        return Ok(Decoded::Retry);
      }

      for &cut in masked.iter() {
        if let Some(part) = table.get_mut(cut) {
          part.arm();
        }
      }
      debug!("launch cuts {:?}", masked);
      Ok(Decoded::Launched(masked))
    }
  }
}
