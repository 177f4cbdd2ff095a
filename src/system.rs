use log::{debug, info, trace};
use std::collections::VecDeque;

use crate::command::Transaction;
use crate::config::Config;
use crate::controller::{Controller, DramController};
use crate::decoder::{self, Decoded};
use crate::dispatch;
use crate::error::{PimError, Result};
use crate::occupancy::{BankOccupancy, RefreshGate};
use crate::partition::PartitionTable;
use crate::pim_record;
use crate::record::{PimEvent, Records};
use crate::router;
use crate::scheduler::{self, Scheduler};

/// Completion callback, called with the transaction address
pub type Callback = Box<dyn FnMut(u64)>;

/// The PIM-capable memory system: per-channel controllers plus the cut
/// scheduler. One `clock_tick` advances everything by one cycle.
pub struct MemorySystem<C: Controller = DramController> {
  config: Config,
  ctrls: Vec<C>,
  table: PartitionTable,
  occupancy: BankOccupancy,
  gate: RefreshGate,
  pim_pending: VecDeque<Transaction>,
  records: Records,
  read_callback: Option<Callback>,
  write_callback: Option<Callback>,
  powered_down: bool,
  clk: u64,
}

impl MemorySystem<DramController> {
  pub fn new(config: Config) -> Result<Self> {
    config.validate()?;
    let ctrls = (0..config.channels()).map(|ch| DramController::new(ch, &config)).collect();
    Self::with_controllers(config, ctrls)
  }
}

impl<C: Controller> MemorySystem<C> {
  pub fn with_controllers(config: Config, ctrls: Vec<C>) -> Result<Self> {
    if ctrls.len() != config.channels() {
      return Err(PimError::Config(format!(
        "{} controllers for {} channels",
        ctrls.len(),
        config.channels()
      )));
    }
    if let Some((slot, ctrl)) = ctrls.iter().enumerate().find(|(slot, c)| c.channel_id() != *slot) {
      return Err(PimError::Config(format!(
        "controller for channel {} placed in slot {}",
        ctrl.channel_id(),
        slot
      )));
    }
    Ok(Self {
      occupancy: BankOccupancy::new(config.channels(), config.banks()),
      gate: RefreshGate::new(config.channels()),
      records: Records::new(config.pim.record_events),
      table: PartitionTable::new(),
      pim_pending: VecDeque::new(),
      read_callback: None,
      write_callback: None,
      powered_down: true,
      clk: 0,
      ctrls,
      config,
    })
  }

  pub fn register_callbacks(&mut self, on_read: Callback, on_write: Callback) {
    self.read_callback = Some(on_read);
    self.write_callback = Some(on_write);
  }

  pub fn will_accept_transaction(&self, hex_addr: u64, is_write: bool) -> bool {
    router::will_accept(&self.ctrls, &self.config, hex_addr, is_write)
  }

  pub fn add_transaction(&mut self, hex_addr: u64, is_write: bool) -> Result<()> {
    router::add(&mut self.ctrls, &self.config, Transaction::new(hex_addr, is_write, self.clk))
  }

  pub fn will_accept_pim(&self) -> bool {
    self.pim_pending.len() < self.config.pim.queue_depth
  }

  /// Queue an instruction word for the decoder
  pub fn add_pim_transaction(&mut self, word: u64) -> Result<()> {
    if !self.will_accept_pim() {
      return Err(PimError::PimQueueFull {
        depth: self.config.pim.queue_depth,
      });
    }
    self.pim_pending.push_back(Transaction::pim(word, self.clk));
    Ok(())
  }

  pub fn clock_tick(&mut self) -> Result<()> {
    self.drain_completions();

    self.gate.poll(&self.ctrls);
    if self.gate.blocks_activates() {
      let released = scheduler::release_all(&mut self.table, &mut self.occupancy)?;
      if released > 0 {
        debug!("clk {} refresh pending, released {} interlocks", self.clk, released);
      }
    }

    self.decode_pending()?;
    scheduler::tick_counters(&mut self.table);

    let outcome = Scheduler::new(
      &self.config,
      &self.ctrls,
      &mut self.occupancy,
      &self.gate,
      &mut self.records,
      self.clk,
    )
    .run(&mut self.table)?;

    if !outcome.finished.is_empty() {
      self.power_down_if_idle();
    }

    dispatch::dispatch(&mut self.ctrls, &outcome.batches, self.clk, &self.config);
    for ctrl in self.ctrls.iter_mut() {
      ctrl.clock_tick();
    }
    self.clk += 1;
    Ok(())
  }

  fn power_down_if_idle(&mut self) {
    if self.powered_down || self.table.any_active() {
      return;
    }
    self.powered_down = true;
    info!("clk {} all cuts idle, PIM array powered down", self.clk);
    pim_record!(self.records, self.clk, None, PimEvent::PoweredDown);
  }

  fn drain_completions(&mut self) {
    for ctrl in self.ctrls.iter_mut() {
      while let Some(trans) = ctrl.return_done_trans(self.clk) {
        let callback = if trans.is_write {
          &mut self.write_callback
        } else {
          &mut self.read_callback
        };
        if let Some(callback) = callback {
          callback(trans.addr);
        }
      }
    }
  }

  /// Look at the oldest pending instruction only
  fn decode_pending(&mut self) -> Result<()> {
    let Some(front) = self.pim_pending.front().copied() else {
      return Ok(());
    };
    let inst = decoder::decode(front.addr, &self.config)?;
    let decoded = decoder::apply(&inst, front.addr, &mut self.table, &mut self.occupancy, &self.config)?;

    match decoded {
      Decoded::Retry => {
        trace!("clk {} instruction {:#x} waits for its cuts", self.clk, front.addr);
        return Ok(());
      }
      Decoded::Reconfigured(df) => {
        pim_record!(
          self.records,
          self.clk,
          None,
          PimEvent::Reconfigured {
            cuts: df.cuts(),
            tile_m: df.tile_m,
            dataflow: df.dataflow,
          }
        );
        self.power_down_if_idle();
      }
      Decoded::Loaded { cut, load, dim } => {
        pim_record!(self.records, self.clk, Some(cut), PimEvent::WorkloadLoaded { load, dim });
      }
      Decoded::Launched(cuts) => {
        for &cut in cuts.iter() {
          pim_record!(self.records, self.clk, Some(cut), PimEvent::Launched);
        }
        if !cuts.is_empty() {
          self.powered_down = false;
        }
      }
    }
    self.pim_pending.pop_front();
    Ok(())
  }

  pub fn clk(&self) -> u64 {
    self.clk
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn partitions(&self) -> &PartitionTable {
    &self.table
  }

  pub fn occupancy(&self) -> &BankOccupancy {
    &self.occupancy
  }

  pub fn refresh_gate(&self) -> &RefreshGate {
    &self.gate
  }

  pub fn records(&self) -> &Records {
    &self.records
  }

  pub fn records_mut(&mut self) -> &mut Records {
    &mut self.records
  }

  pub fn controllers(&self) -> &[C] {
    &self.ctrls
  }

  pub fn controllers_mut(&mut self) -> &mut [C] {
    &mut self.ctrls
  }

  pub fn pending_pim(&self) -> usize {
    self.pim_pending.len()
  }

  /// Every cut inactive (or none configured)
  pub fn powered_down(&self) -> bool {
    self.powered_down
  }

  /// Nothing pending, running or in flight, PIM commands included
  pub fn is_idle(&self) -> bool {
    self.pim_pending.is_empty()
      && !self.table.any_active()
      && self.ctrls.iter().all(|c| c.is_idle() && c.pending_pim() == 0)
  }
}
