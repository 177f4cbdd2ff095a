//! Per-cut tile scheduler.
//!
//! Every active cut walks its weight-stationary tile space:
//! `for n { for k { load weight(k, n); for m { stream input(m, k) } } }`.
//! The main pipeline moves through `Phase` once per step; output tiles are
//! written back by an independent sub-pipeline whenever a computed tile is
//! waiting.

use log::{debug, info, trace};

use crate::command::{Address, Command, CommandType};
use crate::config::Config;
use crate::controller::{Controller, PimQueue};
use crate::dispatch::{self, CommandBatch};
use crate::error::{PimError, Result};
use crate::occupancy::{BankOccupancy, RefreshGate};
use crate::partition::{
  clipped, CutGeometry, DataflowConfig, Partition, PartitionTable, Phase, StreamKind, TileShape, IN_CNT_DONE,
};
use crate::pim_record;
use crate::record::{PimEvent, Records};

/// Why a step did not happen this cycle. Always retried next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
  /// a controller has nothing issuable for one of the targets
  NotReady,
  /// a target bank is held by another sub-pipeline
  BankBusy,
  /// a controller answered with a different command type
  Mixed,
  /// activates are held back around a refresh
  RefreshPending,
  /// the compute engine is still busy with the previous tile
  Dependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
  Activated,
  Column { tile_done: bool },
}

type Step = std::result::Result<Progress, Retry>;

/// Commands accepted this cycle and cuts that went idle
#[derive(Debug, Default)]
pub struct Outcome {
  pub batches: Vec<CommandBatch>,
  pub finished: Vec<usize>,
}

pub fn queue_for(kind: StreamKind) -> PimQueue {
  match kind {
    StreamKind::Weight => PimQueue::Weight,
    StreamKind::Input => PimQueue::Input,
    StreamKind::Output => PimQueue::Output,
  }
}

/// Column command a sub-pipeline streams with
pub fn data_command(kind: StreamKind, df: &DataflowConfig) -> CommandType {
  match kind {
    StreamKind::Weight => CommandType::Read,
    StreamKind::Input if df.dataflow == 0 => CommandType::LocalRead,
    StreamKind::Input => CommandType::GlobalRead,
    StreamKind::Output => CommandType::PimWrite,
  }
}

/// Column range of one tile in the cut's region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAccess {
  pub base_row: u64,
  /// first column offset of the tile from `base_row`
  pub first: u64,
  /// column steps the tile takes
  pub count: u64,
}

impl TileAccess {
  pub fn new(kind: StreamKind, part: &Partition, geo: &CutGeometry, shape: &TileShape, config: &Config) -> Self {
    let w = &part.workload;
    let lanes = (geo.channel_count() * geo.stream_banks(kind).len() * config.pim.column_elems) as u64;
    let (base_row, index, rows, cols, full) = match kind {
      StreamKind::Weight => (
        w.base_row_w,
        part.n_it * shape.k_tiles + part.k_tile_it,
        clipped(w.k, shape.k_tile, part.k_tile_it),
        clipped(w.n, shape.n_tile, part.n_it),
        shape.k_tile * shape.n_tile,
      ),
      StreamKind::Input => (
        w.base_row_in,
        part.m_it * shape.k_tiles + part.k_tile_it,
        clipped(w.m, shape.m_tile, part.m_it),
        clipped(w.k, shape.k_tile, part.k_tile_it),
        shape.m_tile * shape.k_tile,
      ),
      StreamKind::Output => (
        w.base_row_out,
        part.m_out_it * shape.n_tiles + part.n_out_tile_it,
        clipped(w.m, shape.m_tile, part.m_out_it),
        clipped(w.n, shape.n_tile, part.n_out_tile_it),
        shape.m_tile * shape.n_tile,
      ),
    };
    Self {
      base_row,
      first: index * full.div_ceil(lanes),
      count: (rows * cols).div_ceil(lanes).max(1),
    }
  }

  /// (row, column) of step `cursor`
  pub fn locate(&self, cursor: u64, columns: u64) -> (u64, u64) {
    let off = self.first + cursor;
    (self.base_row + off / columns, off % columns)
  }
}

/// One cycle of scheduling over every active cut
pub struct Scheduler<'a, C: Controller> {
  config: &'a Config,
  ctrls: &'a [C],
  occupancy: &'a mut BankOccupancy,
  gate: &'a RefreshGate,
  records: &'a mut Records,
  clk: u64,
  active: usize,
  outcome: Outcome,
}

impl<'a, C: Controller> Scheduler<'a, C> {
  pub fn new(
    config: &'a Config,
    ctrls: &'a [C],
    occupancy: &'a mut BankOccupancy,
    gate: &'a RefreshGate,
    records: &'a mut Records,
    clk: u64,
  ) -> Self {
    Self {
      config,
      ctrls,
      occupancy,
      gate,
      records,
      clk,
      active: 0,
      outcome: Outcome::default(),
    }
  }

  pub fn run(mut self, table: &mut PartitionTable) -> Result<Outcome> {
    self.active = table.active_count();
    let (df, parts, geometry) = table.parts_mut();
    let Some(df) = df.copied() else {
      return Ok(self.outcome);
    };

    for (cut, part) in parts.iter_mut().enumerate() {
      if !part.active {
        continue;
      }
      let geo = &geometry[cut];
      let shape = TileShape::new(&part.workload, &df, self.config);
      self.step_main(cut, part, geo, &df, &shape)?;
      self.step_output(cut, part, geo, &df, &shape)?;
    }
    Ok(self.outcome)
  }

  fn step_main(
    &mut self,
    cut: usize,
    part: &mut Partition,
    geo: &CutGeometry,
    df: &DataflowConfig,
    shape: &TileShape,
  ) -> Result<()> {
    match part.phase {
      Phase::WeightLoad => {
        let step = self.step_stream(cut, part, geo, df, shape, StreamKind::Weight)?;
        if let Ok(Progress::Column { tile_done: true }) = step {
          part.weight.col = 0;
          part.weight_resident = true;
          part.handoff_cnt = self.active.div_ceil(self.config.pim.npu_arrays).max(1) as u32;
          pim_record!(
            self.records,
            self.clk,
            Some(cut),
            PimEvent::WeightLoaded {
              k: part.k_tile_it,
              n: part.n_it,
            }
          );
          self.enter(cut, part, Phase::WeightLoadDone);
        }
        self.note(cut, StreamKind::Weight, step);
      }

      Phase::WeightLoadDone => {
        part.handoff_cnt = part.handoff_cnt.saturating_sub(1);
        if part.handoff_cnt == 0 {
          part.final_pass = part.k_tile_it + 1 == shape.k_tiles;
          self.enter(cut, part, Phase::InputStream);
        }
      }

      Phase::InputStream => {
        if part.vpu_cnt > 0 && !part.input.act_placed && part.input.col == 0 {
          self.note(cut, StreamKind::Input, Err(Retry::Dependency));
          return Ok(());
        }
        let step = self.step_stream(cut, part, geo, df, shape, StreamKind::Input)?;
        if let Ok(Progress::Column { tile_done: true }) = step {
          part.input.col = 0;
          self.finish_input_tile(cut, part, shape);
          self.enter(cut, part, Phase::InputStreamDone);
        }
        self.note(cut, StreamKind::Input, step);
      }

      Phase::InputStreamDone => {
        if part.in_cnt == IN_CNT_DONE {
          return Ok(());
        }
        if part.in_cnt > 0 {
          part.in_cnt -= 1;
        }
        if part.in_cnt == 0 && !part.output_pending() {
          let next = if part.weight_resident {
            Phase::InputStream
          } else {
            Phase::WeightLoad
          };
          self.enter(cut, part, next);
        }
      }
    }
    Ok(())
  }

  /// Record the streamed tile, arm the NPU counters and advance m, then k, then n
  fn finish_input_tile(&mut self, cut: usize, part: &mut Partition, shape: &TileShape) {
    pim_record!(
      self.records,
      self.clk,
      Some(cut),
      PimEvent::TileStreamed {
        m: part.m_it,
        n: part.n_it,
        k: part.k_tile_it,
      }
    );
    if part.final_pass {
      part.out_cnt.push_back(self.config.pim.output_latency);
    }
    part.vpu_cnt = self.config.pim.vpu_latency;

    part.m_it += 1;
    if part.m_it == shape.m_tiles {
      part.m_it = 0;
      part.weight_resident = false;
      part.k_tile_it += 1;
      if part.k_tile_it == shape.k_tiles {
        part.k_tile_it = 0;
        part.n_it += 1;
      }
    }

    if part.n_it == shape.n_tiles {
      part.in_cnt = IN_CNT_DONE;
      info!("cut {} streamed all {} tiles", cut, shape.total());
      pim_record!(self.records, self.clk, Some(cut), PimEvent::ComputeFinished);
    } else {
      part.in_cnt = self.config.pim.load_latency as i64;
    }
  }

  fn step_output(
    &mut self,
    cut: usize,
    part: &mut Partition,
    geo: &CutGeometry,
    df: &DataflowConfig,
    shape: &TileShape,
  ) -> Result<()> {
    if part.output_valid == 0 {
      return Ok(());
    }
    let step = self.step_stream(cut, part, geo, df, shape, StreamKind::Output)?;
    if let Ok(Progress::Column { tile_done: true }) = step {
      part.output.col = 0;
      part.output_valid -= 1;
      pim_record!(
        self.records,
        self.clk,
        Some(cut),
        PimEvent::OutputWritten {
          m: part.m_out_it,
          n: part.n_out_tile_it,
        }
      );

      part.m_out_it += 1;
      if part.m_out_it == shape.m_tiles {
        part.m_out_it = 0;
        part.n_out_tile_it += 1;
      }
      if part.n_out_tile_it == shape.n_tiles {
        part.active = false;
        info!("cut {} finished at clk {}", cut, self.clk);
        pim_record!(self.records, self.clk, Some(cut), PimEvent::PartitionIdle);
        self.outcome.finished.push(cut);
      }
    }
    self.note(cut, StreamKind::Output, step);
    Ok(())
  }

  /// One activate or one column step of a sub-pipeline across all its targets
  fn step_stream(
    &mut self,
    cut: usize,
    part: &mut Partition,
    geo: &CutGeometry,
    df: &DataflowConfig,
    shape: &TileShape,
    kind: StreamKind,
  ) -> Result<Step> {
    let columns = self.config.columns() as u64;
    let access = TileAccess::new(kind, part, geo, shape, self.config);
    let stream = *part.stream(kind);
    let (row, col) = access.locate(stream.col, columns);
    let rows = self.config.dram.rows as u64;
    if row >= rows {
      return Err(PimError::RowOutOfRange { row, rows });
    }
    let targets = geo.targets(kind);
    let queue = queue_for(kind);

    if !stream.act_placed {
      if self.gate.blocks_activates() {
        return Ok(Err(Retry::RefreshPending));
      }
      if !self.occupancy.all_free(&targets) {
        return Ok(Err(Retry::BankBusy));
      }
      let candidates = self.candidates(&targets, CommandType::PimActivate, row, 0);
      let batch = match dispatch::build_batch(self.ctrls, queue, candidates, self.clk) {
        Ok(batch) => batch,
        Err(retry) => return Ok(Err(retry)),
      };
      for &(ch, bank) in targets.iter() {
        self.occupancy.acquire(ch, bank)?;
      }
      part.stream_mut(kind).act_placed = true;
      self.accept(cut, batch, row, 0);
      return Ok(Ok(Progress::Activated));
    }

    let mut close = stream.col + 1 == access.count || col + 1 == columns;
    if kind == StreamKind::Weight {
      let mux_span = (columns / df.ucf as u64).max(1);
      close |= (col + 1) % mux_span == 0;
    }
    let mut cmd_type = data_command(kind, df);
    if close {
      cmd_type = cmd_type.with_precharge();
    }

    let candidates = self.candidates(&targets, cmd_type, row, col);
    let batch = match dispatch::build_batch(self.ctrls, queue, candidates, self.clk) {
      Ok(batch) => batch,
      Err(retry) => return Ok(Err(retry)),
    };
    if close {
      for &(ch, bank) in targets.iter() {
        self.occupancy.release(ch, bank)?;
      }
    }
    let stream = part.stream_mut(kind);
    stream.act_placed = !close;
    stream.col += 1;
    let tile_done = stream.col >= access.count;
    self.accept(cut, batch, row, col);
    Ok(Ok(Progress::Column { tile_done }))
  }

  fn candidates(&self, targets: &[(usize, usize)], cmd_type: CommandType, row: u64, col: u64) -> Vec<Command> {
    targets
      .iter()
      .map(|&(channel, flat)| {
        let (rank, bankgroup, bank) = self.config.split_bank(flat);
        let addr = Address {
          channel,
          rank,
          bankgroup,
          bank,
          row: row as u32,
          column: col as u32,
        };
        Command::new(cmd_type, addr, self.config.address_unmapping(&addr))
      })
      .collect()
  }

  fn accept(&mut self, cut: usize, batch: CommandBatch, row: u64, col: u64) {
    pim_record!(
      self.records,
      self.clk,
      Some(cut),
      PimEvent::BatchDispatched {
        queue: batch.queue,
        cmd: batch.cmd_type(),
        targets: batch.len(),
        row,
        col,
      }
    );
    self.outcome.batches.push(batch);
  }

  fn enter(&self, cut: usize, part: &mut Partition, phase: Phase) {
    debug!("clk {} cut {} {:?} -> {:?}", self.clk, cut, part.phase, phase);
    part.phase = phase;
  }

  fn note(&self, cut: usize, kind: StreamKind, step: Step) {
    if let Err(retry) = step {
      trace!("clk {} cut {} {:?} retry: {:?}", self.clk, cut, kind, retry);
    }
  }
}

/// Count down the NPU side: compute-engine busy time and pending outputs
pub fn tick_counters(table: &mut PartitionTable) {
  for part in table.iter_mut().filter(|p| p.active) {
    part.vpu_cnt = part.vpu_cnt.saturating_sub(1);
    for cnt in part.out_cnt.iter_mut() {
      *cnt = cnt.saturating_sub(1);
    }
    while part.out_cnt.front() == Some(&0) {
      part.out_cnt.pop_front();
      part.output_valid += 1;
    }
  }
}

/// Drop every activate interlock of one cut and hand its banks back
pub fn release_cut(table: &mut PartitionTable, cut: usize, occupancy: &mut BankOccupancy) -> Result<usize> {
  let (_, parts, geometry) = table.parts_mut();
  let (Some(part), Some(geo)) = (parts.get_mut(cut), geometry.get(cut)) else {
    return Ok(0);
  };
  let mut released = 0;
  for kind in [StreamKind::Weight, StreamKind::Input, StreamKind::Output] {
    let stream = part.stream_mut(kind);
    if !stream.act_placed {
      continue;
    }
    stream.act_placed = false;
    for (ch, bank) in geo.targets(kind) {
      occupancy.release(ch, bank)?;
    }
    released += 1;
  }
  Ok(released)
}

/// `release_cut` over every cut; used when a refresh closes the banks
pub fn release_all(table: &mut PartitionTable, occupancy: &mut BankOccupancy) -> Result<usize> {
  let mut released = 0;
  for cut in 0..table.len() {
    released += release_cut(table, cut, occupancy)?;
  }
  Ok(released)
}
