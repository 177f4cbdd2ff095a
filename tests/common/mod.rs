#![allow(dead_code)]

use pimsim::bitfield::{pack, DATAFLOW, WORKLOAD};
use pimsim::command::{Command, CommandType, Transaction};
use pimsim::partition::StreamKind;
use pimsim::record::PimEvent;
use pimsim::{Config, Controller, MemorySystem, PimQueue};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// One command handed to a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pushed {
  pub clk: u64,
  pub queue: PimQueue,
  pub cmd: Command,
  pub release: u64,
}

pub type PushLog = Rc<RefCell<Vec<Pushed>>>;

/// Controller double: every candidate is ready unless told otherwise,
/// refresh flags are set by the test, every pushed command is logged.
pub struct ScriptedController {
  pub channel: usize,
  pub in_refresh: bool,
  pub imminent: bool,
  /// answer every candidate with `Invalid`
  pub refuse: bool,
  /// refuse on cycles divisible by this
  pub stall_every: Option<u64>,
  /// answer every candidate with this command type instead
  pub answer_with: Option<CommandType>,
  pub log: PushLog,
  clk: u64,
  queue: VecDeque<Transaction>,
}

impl ScriptedController {
  pub fn new(channel: usize, log: PushLog) -> Self {
    Self {
      channel,
      in_refresh: false,
      imminent: false,
      refuse: false,
      stall_every: None,
      answer_with: None,
      log,
      clk: 0,
      queue: VecDeque::new(),
    }
  }
}

impl Controller for ScriptedController {
  fn channel_id(&self) -> usize {
    self.channel
  }

  fn will_accept_transaction(&self, _hex_addr: u64, _is_write: bool) -> bool {
    self.queue.len() < 4
  }

  fn add_transaction(&mut self, mut trans: Transaction) -> bool {
    if self.queue.len() >= 4 {
      return false;
    }
    trans.complete_cycle = self.clk + 1;
    self.queue.push_back(trans);
    true
  }

  fn return_done_trans(&mut self, clk: u64) -> Option<Transaction> {
    if self.queue.front().is_some_and(|t| t.complete_cycle <= clk) {
      return self.queue.pop_front();
    }
    None
  }

  fn get_ready_command(&self, cmd: &Command, clk: u64) -> Command {
    let stalled = self.stall_every.is_some_and(|n| clk % n == 0);
    if self.refuse || stalled || self.in_refresh {
      return Command::invalid();
    }
    match self.answer_with {
      Some(other) => cmd.retyped(other),
      None => *cmd,
    }
  }

  fn is_in_refresh(&self) -> bool {
    self.in_refresh
  }

  fn refresh_imminent(&self) -> bool {
    self.imminent
  }

  fn push_pim_command(&mut self, queue: PimQueue, cmd: Command, release: u64) {
    self.log.borrow_mut().push(Pushed {
      clk: self.clk,
      queue,
      cmd,
      release,
    });
  }

  fn pending_pim(&self) -> usize {
    0
  }

  fn clock_tick(&mut self) {
    self.clk += 1;
  }

  fn is_idle(&self) -> bool {
    self.queue.is_empty()
  }
}

pub fn scripted_system(config: Config) -> (MemorySystem<ScriptedController>, PushLog) {
  let log: PushLog = Rc::new(RefCell::new(Vec::new()));
  let ctrls = (0..config.channels())
    .map(|ch| ScriptedController::new(ch, log.clone()))
    .collect();
  let sys = MemorySystem::with_controllers(config, ctrls).unwrap();
  (sys, log)
}

pub fn dataflow_word(vcuts_log2: u64, hcuts_log2: u64, tile_m_log2: u64, dataflow: u64) -> u64 {
  pack(
    DATAFLOW,
    &[
      ("class", 3),
      ("vcuts_log2", vcuts_log2),
      ("hcuts_log2", hcuts_log2),
      ("tile_m_log2", tile_m_log2),
      ("dataflow", dataflow),
    ],
  )
}

pub fn workload_word(cut: u64, load_type: u64, dim: u64, base_row: u64) -> u64 {
  pack(
    WORKLOAD,
    &[("cut", cut), ("load_type", load_type), ("dim", dim), ("base_row", base_row)],
  )
}

pub fn launch_word(mask: u64) -> u64 {
  1 | (mask << 1)
}

/// Instruction words for one cut: M with weight base, K with output base, N with input base
pub fn gemm_words(cut: u64, m: u64, n: u64, k: u64) -> Vec<u64> {
  vec![
    workload_word(cut, 0, m, 0x10 + cut * 0x400),
    workload_word(cut, 1, k, 0x200 + cut * 0x400),
    workload_word(cut, 2, n, 0x100 + cut * 0x400),
  ]
}

pub fn submit<C: Controller>(sys: &mut MemorySystem<C>, words: &[u64]) {
  for &word in words {
    sys.add_pim_transaction(word).unwrap();
  }
}

/// Tick until every instruction is consumed and every cut has gone idle
pub fn run_until_idle<C: Controller>(sys: &mut MemorySystem<C>, limit: u64) {
  let start = sys.clk();
  while sys.pending_pim() > 0 || sys.partitions().any_active() {
    assert!(sys.clk() - start < limit, "no progress after {} cycles", limit);
    sys.clock_tick().unwrap();
  }
}

pub fn tiles_streamed<C: Controller>(sys: &MemorySystem<C>, cut: usize) -> Vec<(u64, u64, u64)> {
  sys
    .records()
    .iter()
    .filter(|r| r.cut == Some(cut))
    .filter_map(|r| match r.event {
      PimEvent::TileStreamed { m, n, k } => Some((m, n, k)),
      _ => None,
    })
    .collect()
}

pub fn outputs_written<C: Controller>(sys: &MemorySystem<C>, cut: usize) -> Vec<(u64, u64)> {
  sys
    .records()
    .iter()
    .filter(|r| r.cut == Some(cut))
    .filter_map(|r| match r.event {
      PimEvent::OutputWritten { m, n } => Some((m, n)),
      _ => None,
    })
    .collect()
}

/// Held banks must be exactly the targets of the streams with an activate placed
pub fn assert_grid_consistent<C: Controller>(sys: &MemorySystem<C>) {
  let mut expected = 0;
  for (cut, part) in sys.partitions().iter().enumerate() {
    let geo = sys.partitions().geometry(cut).unwrap();
    for kind in [StreamKind::Weight, StreamKind::Input, StreamKind::Output] {
      if part.stream(kind).act_placed {
        let targets = geo.targets(kind);
        for &(ch, bank) in targets.iter() {
          assert!(!sys.occupancy().is_bank_free(ch, bank), "clk {}: ({},{}) not held", sys.clk(), ch, bank);
        }
        expected += targets.len();
      }
    }
  }
  assert_eq!(sys.occupancy().held_count(), expected, "clk {}", sys.clk());
}
