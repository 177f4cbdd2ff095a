use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::command::Address;
use crate::error::{PimError, Result};

/// DRAM organisation and address mapping
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DramSection {
  pub channels: usize,
  pub ranks: usize,
  pub bankgroups: usize,
  pub banks_per_group: usize,
  pub rows: usize,
  /// column commands per row
  pub columns: usize,
  /// low address bits below the column field (burst offset)
  pub shift_bits: u32,
  /// per-channel ordinary transaction queue depth
  pub trans_queue_size: usize,
}

impl Default for DramSection {
  fn default() -> Self {
    Self {
      channels: 8,
      ranks: 1,
      bankgroups: 4,
      banks_per_group: 4,
      rows: 16384,
      columns: 32,
      shift_bits: 5,
      trans_queue_size: 32,
    }
  }
}

/// Timing constants in cycles
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingSection {
  pub tccd_l: u64,
  pub tccd_s: u64,
  pub trcdrd: u64,
  pub trcdwr: u64,
  pub trp: u64,
  pub tras: u64,
  pub trefi: u64,
  pub trfc: u64,
  pub read_latency: u64,
  pub write_latency: u64,
}

impl Default for TimingSection {
  fn default() -> Self {
    Self {
      tccd_l: 4,
      tccd_s: 2,
      trcdrd: 14,
      trcdwr: 10,
      trp: 14,
      tras: 34,
      trefi: 3900,
      trfc: 260,
      read_latency: 20,
      write_latency: 10,
    }
  }
}

/// Processing-element array and scheduler parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PimSection {
  /// PE array rows, the K tile
  pub pe_rows: usize,
  /// PE array columns, the N tile
  pub pe_cols: usize,
  /// elements one column command moves per bank
  pub column_elems: usize,
  pub max_tile_m: u64,
  /// PE arrays shared by all cuts
  pub npu_arrays: usize,
  pub load_latency: u32,
  pub vpu_latency: u32,
  pub output_latency: u32,
  pub input_release_delay: u64,
  /// cycles ahead of a refresh at which PIM activates stop
  pub refresh_guard: u64,
  pub queue_depth: usize,
  pub record_events: bool,
}

impl Default for PimSection {
  fn default() -> Self {
    Self {
      pe_rows: 128,
      pe_cols: 128,
      column_elems: 16,
      max_tile_m: 4096,
      npu_arrays: 4,
      load_latency: 4,
      vpu_latency: 8,
      output_latency: 16,
      input_release_delay: 0,
      refresh_guard: 64,
      queue_depth: 32,
      record_events: true,
    }
  }
}

/// Everything the memory system needs
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
  #[serde(default)]
  pub dram: DramSection,
  #[serde(default)]
  pub timing: TimingSection,
  #[serde(default)]
  pub pim: PimSection,
}

/// Driver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationSection {
  /// 0 runs until the trace drains
  pub cycles: u64,
  pub quiet: bool,
  pub step_mode: bool,
  pub record_file: String,
}

impl Default for SimulationSection {
  fn default() -> Self {
    Self {
      cycles: 0,
      quiet: false,
      step_mode: false,
      record_file: String::new(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
  #[serde(default)]
  pub dram: DramSection,
  #[serde(default)]
  pub timing: TimingSection,
  #[serde(default)]
  pub pim: PimSection,
  #[serde(default)]
  pub simulation: SimulationSection,
}

impl AppConfig {
  pub fn config(&self) -> Config {
    Config {
      dram: self.dram.clone(),
      timing: self.timing.clone(),
      pim: self.pim.clone(),
    }
  }
}

/// Load a config file layered with `PIMSIM_*` environment overrides,
/// e.g. `PIMSIM_DRAM__CHANNELS=4`.
pub fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
  let mut builder = ::config::Config::builder();
  if let Some(path) = path {
    builder = builder.add_source(::config::File::from(path));
  }
  builder = builder.add_source(
    ::config::Environment::with_prefix("PIMSIM")
      .prefix_separator("_")
      .separator("__")
      .try_parsing(true),
  );

  let app: AppConfig = builder.build()?.try_deserialize()?;
  app.config().validate()?;
  Ok(app)
}

pub fn parse_app_config(content: &str) -> Result<AppConfig> {
  let app: AppConfig = toml::from_str(content)?;
  app.config().validate()?;
  Ok(app)
}

fn log2(value: usize) -> u32 {
  value.trailing_zeros()
}

fn field(value: u64, pos: u32, width: u32) -> u64 {
  (value >> pos) & ((1u64 << width) - 1)
}

impl Config {
  pub fn channels(&self) -> usize {
    self.dram.channels
  }

  /// Banks per channel, flattened over ranks and bankgroups
  pub fn banks(&self) -> usize {
    self.dram.ranks * self.dram.bankgroups * self.dram.banks_per_group
  }

  pub fn columns(&self) -> usize {
    self.dram.columns
  }

  pub fn validate(&self) -> Result<()> {
    let d = &self.dram;
    let pow2 = [
      ("channels", d.channels),
      ("ranks", d.ranks),
      ("bankgroups", d.bankgroups),
      ("banks_per_group", d.banks_per_group),
      ("rows", d.rows),
      ("columns", d.columns),
    ];
    for (name, value) in pow2 {
      if value == 0 || !value.is_power_of_two() {
        return Err(PimError::Config(format!("dram.{} must be a power of two, got {}", name, value)));
      }
    }
    if d.trans_queue_size == 0 {
      return Err(PimError::Config("dram.trans_queue_size must be non-zero".to_string()));
    }

    let p = &self.pim;
    if p.pe_rows == 0 || p.pe_cols == 0 || p.column_elems == 0 || p.npu_arrays == 0 {
      return Err(PimError::Config(
        "pim.pe_rows, pe_cols, column_elems and npu_arrays must be non-zero".to_string(),
      ));
    }
    if p.queue_depth == 0 {
      return Err(PimError::Config("pim.queue_depth must be non-zero".to_string()));
    }
    if p.refresh_guard <= p.input_release_delay {
      return Err(PimError::Config(format!(
        "pim.refresh_guard ({}) must exceed pim.input_release_delay ({})",
        p.refresh_guard, p.input_release_delay
      )));
    }

    let t = &self.timing;
    if t.trfc >= t.trefi {
      return Err(PimError::Config(format!("timing.trfc ({}) must be below timing.trefi ({})", t.trfc, t.trefi)));
    }
    Ok(())
  }

  /// Channel of an ordinary host address
  pub fn channel_of(&self, hex_addr: u64) -> usize {
    let pos = self.dram.shift_bits + log2(self.dram.columns);
    field(hex_addr, pos, log2(self.dram.channels)) as usize
  }

  /// Address bits from LSB: offset | column | channel | bank | bankgroup | rank | row
  pub fn address_mapping(&self, hex_addr: u64) -> Address {
    let d = &self.dram;
    let mut pos = d.shift_bits;
    let mut take = |width: u32| {
      let v = field(hex_addr, pos, width);
      pos += width;
      v
    };
    let column = take(log2(d.columns)) as u32;
    let channel = take(log2(d.channels)) as usize;
    let bank = take(log2(d.banks_per_group)) as usize;
    let bankgroup = take(log2(d.bankgroups)) as usize;
    let rank = take(log2(d.ranks)) as usize;
    let row = take(log2(d.rows)) as u32;
    Address {
      channel,
      rank,
      bankgroup,
      bank,
      row,
      column,
    }
  }

  /// Inverse of `address_mapping`; out-of-range fields are truncated
  pub fn address_unmapping(&self, addr: &Address) -> u64 {
    let d = &self.dram;
    let parts = [
      (addr.column as u64, log2(d.columns)),
      (addr.channel as u64, log2(d.channels)),
      (addr.bank as u64, log2(d.banks_per_group)),
      (addr.bankgroup as u64, log2(d.bankgroups)),
      (addr.rank as u64, log2(d.ranks)),
      (addr.row as u64, log2(d.rows)),
    ];
    let mut pos = d.shift_bits;
    let mut hex = 0u64;
    for (value, width) in parts {
      hex |= (value & ((1u64 << width) - 1)) << pos;
      pos += width;
    }
    hex
  }

  /// Split a flat per-channel bank index into (rank, bankgroup, bank)
  pub fn split_bank(&self, flat: usize) -> (usize, usize, usize) {
    let d = &self.dram;
    let per_rank = d.bankgroups * d.banks_per_group;
    (flat / per_rank, (flat % per_rank) / d.banks_per_group, flat % d.banks_per_group)
  }

  pub fn flat_bank(&self, addr: &Address) -> usize {
    let d = &self.dram;
    (addr.rank * d.bankgroups + addr.bankgroup) * d.banks_per_group + addr.bank
  }
}
