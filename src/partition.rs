use std::collections::VecDeque;
use std::ops::Range;

use crate::config::Config;

/// Sentinel in `Partition::in_cnt` once every tile has been streamed
pub const IN_CNT_DONE: i64 = -1;

/// Dataflow configuration shared by all cuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataflowConfig {
  pub vcuts: usize,
  pub hcuts: usize,
  /// multi-column factor; divides the weight banks of a cut
  pub mcf: usize,
  /// unrolled column factor; sets the weight multiplexing boundary
  pub ucf: usize,
  /// 0 = local reads, 1 = global reads for the input stream
  pub dataflow: u8,
  pub tile_m: usize,
  pub vcuts_next: usize,
  pub hcuts_next: usize,
  pub kernel_size: usize,
  pub stride: usize,
}

impl DataflowConfig {
  pub fn cuts(&self) -> usize {
    self.vcuts * self.hcuts
  }
}

/// Per-cut matrix shape and base rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Workload {
  pub m: u64,
  pub n: u64,
  pub k: u64,
  pub base_row_w: u64,
  pub base_row_in: u64,
  pub base_row_out: u64,
}

impl Workload {
  pub fn is_populated(&self) -> bool {
    self.m != 0 && self.n != 0 && self.k != 0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  WeightLoad,
  WeightLoadDone,
  InputStream,
  InputStreamDone,
}

/// Column cursor and activate interlock of one sub-pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stream {
  pub act_placed: bool,
  pub col: u64,
}

impl Stream {
  pub fn reset(&mut self) {
    *self = Stream::default();
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
  Weight,
  Input,
  Output,
}

/// Channel and bank slice owned by one cut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutGeometry {
  pub channels: Range<usize>,
  pub banks: Range<usize>,
  pub weight_banks: usize,
}

impl CutGeometry {
  pub fn new(cut: usize, df: &DataflowConfig, config: &Config) -> Self {
    let ch_per_cut = config.channels() / df.hcuts;
    let banks_per_cut = config.banks() / df.vcuts;
    let h = cut % df.hcuts;
    let v = cut / df.hcuts;
    Self {
      channels: h * ch_per_cut..(h + 1) * ch_per_cut,
      banks: v * banks_per_cut..(v + 1) * banks_per_cut,
      weight_banks: (banks_per_cut / df.mcf).max(1),
    }
  }

  pub fn channel_count(&self) -> usize {
    self.channels.len()
  }

  pub fn input_bank(&self) -> usize {
    self.banks.start
  }

  pub fn output_bank(&self) -> usize {
    if self.banks.len() > 1 {
      self.banks.start + 1
    } else {
      self.banks.start
    }
  }

  /// Banks touched by a sub-pipeline, in every channel of the cut
  pub fn stream_banks(&self, kind: StreamKind) -> Range<usize> {
    match kind {
      StreamKind::Weight => self.banks.start..self.banks.start + self.weight_banks,
      StreamKind::Input => self.input_bank()..self.input_bank() + 1,
      StreamKind::Output => self.output_bank()..self.output_bank() + 1,
    }
  }

  pub fn targets(&self, kind: StreamKind) -> Vec<(usize, usize)> {
    let banks = self.stream_banks(kind);
    self
      .channels
      .clone()
      .flat_map(|ch| banks.clone().map(move |bank| (ch, bank)))
      .collect()
  }
}

/// Tile extents of one cut's workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileShape {
  pub m_tile: u64,
  pub n_tile: u64,
  pub k_tile: u64,
  pub m_tiles: u64,
  pub n_tiles: u64,
  pub k_tiles: u64,
}

impl TileShape {
  pub fn new(workload: &Workload, df: &DataflowConfig, config: &Config) -> Self {
    let m_tile = df.tile_m as u64;
    let n_tile = config.pim.pe_cols as u64;
    let k_tile = config.pim.pe_rows as u64;
    Self {
      m_tile,
      n_tile,
      k_tile,
      m_tiles: workload.m.div_ceil(m_tile),
      n_tiles: workload.n.div_ceil(n_tile),
      k_tiles: workload.k.div_ceil(k_tile),
    }
  }

  pub fn total(&self) -> u64 {
    self.m_tiles * self.n_tiles * self.k_tiles
  }
}

/// Extent of tile `it` along a dimension of length `dim`
pub fn clipped(dim: u64, tile: u64, it: u64) -> u64 {
  tile.min(dim.saturating_sub(it * tile))
}

/// All mutable state of one cut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  pub workload: Workload,
  pub active: bool,
  pub phase: Phase,

  // tile cursors
  pub m_it: u64,
  pub n_it: u64,
  pub k_tile_it: u64,
  pub m_out_it: u64,
  pub n_out_tile_it: u64,

  pub weight: Stream,
  pub input: Stream,
  pub output: Stream,

  /// weight tile for (k_tile_it, n_it) already in the PE array
  pub weight_resident: bool,
  /// current weight pass uses the last K tile
  pub final_pass: bool,
  pub handoff_cnt: u32,

  // NPU side
  /// load-to-compute countdown, `IN_CNT_DONE` once all tiles are streamed
  pub in_cnt: i64,
  pub vpu_cnt: u32,
  /// compute-to-output countdowns in flight
  pub out_cnt: VecDeque<u32>,
  /// computed output tiles waiting for the output sub-pipeline
  pub output_valid: u32,
}

impl Default for Partition {
  fn default() -> Self {
    Self {
      workload: Workload::default(),
      active: false,
      phase: Phase::WeightLoad,
      m_it: 0,
      n_it: 0,
      k_tile_it: 0,
      m_out_it: 0,
      n_out_tile_it: 0,
      weight: Stream::default(),
      input: Stream::default(),
      output: Stream::default(),
      weight_resident: false,
      final_pass: false,
      handoff_cnt: 0,
      in_cnt: 0,
      vpu_cnt: 0,
      out_cnt: VecDeque::new(),
      output_valid: 0,
    }
  }
}

impl Partition {
  /// Reset scheduling state for a new launch, keeping the workload
  pub fn arm(&mut self) {
    let workload = self.workload;
    *self = Partition {
      workload,
      active: true,
      ..Partition::default()
    };
  }

  pub fn is_compute_finished(&self) -> bool {
    self.in_cnt == IN_CNT_DONE
  }

  pub fn stream(&self, kind: StreamKind) -> &Stream {
    match kind {
      StreamKind::Weight => &self.weight,
      StreamKind::Input => &self.input,
      StreamKind::Output => &self.output,
    }
  }

  pub fn stream_mut(&mut self, kind: StreamKind) -> &mut Stream {
    match kind {
      StreamKind::Weight => &mut self.weight,
      StreamKind::Input => &mut self.input,
      StreamKind::Output => &mut self.output,
    }
  }

  pub fn output_pending(&self) -> bool {
    self.output_valid > 0 || !self.out_cnt.is_empty()
  }
}

/// The cut table. Reconfiguration replaces every entry at once.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
  dataflow: Option<DataflowConfig>,
  cuts: Vec<Partition>,
  geometry: Vec<CutGeometry>,
}

impl PartitionTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reconfigure(&mut self, df: DataflowConfig, config: &Config) {
    let count = df.cuts();
    self.cuts = vec![Partition::default(); count];
    self.geometry = (0..count).map(|cut| CutGeometry::new(cut, &df, config)).collect();
    self.dataflow = Some(df);
  }

  pub fn dataflow(&self) -> Option<&DataflowConfig> {
    self.dataflow.as_ref()
  }

  pub fn len(&self) -> usize {
    self.cuts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cuts.is_empty()
  }

  pub fn get(&self, cut: usize) -> Option<&Partition> {
    self.cuts.get(cut)
  }

  pub fn get_mut(&mut self, cut: usize) -> Option<&mut Partition> {
    self.cuts.get_mut(cut)
  }

  pub fn geometry(&self, cut: usize) -> Option<&CutGeometry> {
    self.geometry.get(cut)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Partition> {
    self.cuts.iter()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Partition> {
    self.cuts.iter_mut()
  }

  /// Split borrow used by the scheduler
  pub fn parts_mut(&mut self) -> (Option<&DataflowConfig>, &mut [Partition], &[CutGeometry]) {
    (self.dataflow.as_ref(), &mut self.cuts, &self.geometry)
  }

  pub fn active_count(&self) -> usize {
    self.cuts.iter().filter(|p| p.active).count()
  }

  pub fn any_active(&self) -> bool {
    self.cuts.iter().any(|p| p.active)
  }
}
