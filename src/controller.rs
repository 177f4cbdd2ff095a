use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::command::{Command, CommandType, Transaction};
use crate::config::Config;

/// Per-channel PIM command sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PimQueue {
  Weight,
  Input,
  Output,
  Generic,
}

impl PimQueue {
  pub const ALL: [PimQueue; 4] = [PimQueue::Weight, PimQueue::Input, PimQueue::Output, PimQueue::Generic];

  fn index(self) -> usize {
    match self {
      PimQueue::Weight => 0,
      PimQueue::Input => 1,
      PimQueue::Output => 2,
      PimQueue::Generic => 3,
    }
  }
}

/// The per-channel controller the memory system drives.
///
/// It owns command legality and timing; the memory system only asks whether
/// a candidate command may go now and hands over the ones it accepted.
pub trait Controller {
  fn channel_id(&self) -> usize;

  fn will_accept_transaction(&self, hex_addr: u64, is_write: bool) -> bool;

  fn add_transaction(&mut self, trans: Transaction) -> bool;

  /// Next completed ordinary transaction, if any finished by `clk`
  fn return_done_trans(&mut self, clk: u64) -> Option<Transaction>;

  /// The candidate itself when it may issue now, the command it depends on
  /// (a different type) when the bank is in the wrong state, or
  /// `Command::invalid()` when nothing may issue yet.
  fn get_ready_command(&self, cmd: &Command, clk: u64) -> Command;

  fn is_in_refresh(&self) -> bool;

  fn refresh_imminent(&self) -> bool;

  /// Input entries are held back until `release`
  fn push_pim_command(&mut self, queue: PimQueue, cmd: Command, release: u64);

  /// PIM commands queued but not yet issued
  fn pending_pim(&self) -> usize;

  fn clock_tick(&mut self);

  /// No ordinary transaction queued or in flight
  fn is_idle(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
struct BankState {
  open_row: Option<u32>,
  pim_held: bool,
  act_ready: u64,
  read_ready: u64,
  write_ready: u64,
  pre_ready: u64,
}

/// Reference controller: per-bank row state, basic JEDEC timing, periodic
/// all-bank refresh, close-page FCFS ordinary path. PIM commands win the
/// command bus over ordinary ones.
#[derive(Debug, Clone)]
pub struct DramController {
  channel: usize,
  config: Config,
  clk: u64,
  banks: Vec<BankState>,
  pim_queues: [VecDeque<(Command, u64)>; 4],
  trans_queue: VecDeque<Transaction>,
  in_flight: Vec<Transaction>,
  next_refresh: u64,
  refresh_until: u64,
  pim_issued: u64,
  refreshes: u64,
}

impl DramController {
  pub fn new(channel: usize, config: &Config) -> Self {
    Self {
      channel,
      config: config.clone(),
      clk: 0,
      banks: vec![BankState::default(); config.banks()],
      pim_queues: Default::default(),
      trans_queue: VecDeque::new(),
      in_flight: Vec::new(),
      next_refresh: config.timing.trefi,
      refresh_until: 0,
      pim_issued: 0,
      refreshes: 0,
    }
  }

  pub fn clk(&self) -> u64 {
    self.clk
  }

  pub fn pim_issued(&self) -> u64 {
    self.pim_issued
  }

  pub fn refreshes(&self) -> u64 {
    self.refreshes
  }

  pub fn open_row(&self, bank: usize) -> Option<u32> {
    self.banks[bank].open_row
  }

  fn column_ready(&self, bank: &BankState, cmd_type: CommandType) -> u64 {
    if cmd_type.is_write() {
      bank.write_ready
    } else {
      bank.read_ready
    }
  }

  fn start_refresh(&mut self) {
    let t = &self.config.timing;
    self.refresh_until = self.clk + t.trfc;
    self.next_refresh += t.trefi;
    self.refreshes += 1;
    for bank in self.banks.iter_mut() {
      bank.open_row = None;
      bank.pim_held = false;
      bank.act_ready = bank.act_ready.max(self.refresh_until);
    }
    trace!("ch{} {} until {}", self.channel, CommandType::Refresh, self.refresh_until);
  }

  /// Apply the bank-state effects of an issued command
  fn apply(&mut self, cmd: &Command, pim: bool) {
    let t = self.config.timing.clone();
    let now = self.clk;
    let flat = self.config.flat_bank(&cmd.addr);
    let bankgroup = cmd.addr.bankgroup;
    let per_group = self.config.dram.banks_per_group;
    let bankgroups = self.config.dram.bankgroups;

    match cmd.cmd_type {
      c if c.is_activate() => {
        let bank = &mut self.banks[flat];
        bank.open_row = Some(cmd.addr.row);
        bank.pim_held = pim && c == CommandType::PimActivate;
        bank.read_ready = bank.read_ready.max(now + t.trcdrd);
        bank.write_ready = bank.write_ready.max(now + t.trcdwr);
        bank.pre_ready = now + t.tras;
      }
      c if c.is_column() => {
        for (i, bank) in self.banks.iter_mut().enumerate() {
          let same_group = (i / per_group) % bankgroups == bankgroup;
          let gap = if same_group { t.tccd_l } else { t.tccd_s };
          if c.is_write() {
            bank.write_ready = bank.write_ready.max(now + gap);
          } else {
            bank.read_ready = bank.read_ready.max(now + gap);
          }
        }
        if c.closes_bank() {
          let bank = &mut self.banks[flat];
          let pre_at = now.max(bank.pre_ready);
          bank.open_row = None;
          bank.pim_held = false;
          bank.act_ready = pre_at + t.trp;
        }
      }
      CommandType::Precharge => {
        let bank = &mut self.banks[flat];
        bank.open_row = None;
        bank.pim_held = false;
        bank.act_ready = now + t.trp;
      }
      _ => {},
    }
  }

  fn issue_pim(&mut self) -> bool {
    let now = self.clk;
    let mut issued = Vec::new();
    for queue in PimQueue::ALL {
      let q = &mut self.pim_queues[queue.index()];
      while let Some(&(cmd, release)) = q.front() {
        if release > now {
          break;
        }
        q.pop_front();
        issued.push(cmd);
      }
    }

    for cmd in issued.iter() {
      let flat = self.config.flat_bank(&cmd.addr);
      if cmd.cmd_type.is_column() && self.banks[flat].open_row != Some(cmd.addr.row) {
        warn!("ch{} dropped {} on a closed row", self.channel, cmd);
        continue;
      }
      trace!("ch{} clk {} issue {}", self.channel, now, cmd);
      self.apply(cmd, true);
      self.pim_issued += 1;
    }
    !issued.is_empty()
  }

  fn issue_ordinary(&mut self) {
    let now = self.clk;
    for i in 0..self.trans_queue.len() {
      let trans = self.trans_queue[i];
      let addr = self.config.address_mapping(trans.addr);
      let flat = self.config.flat_bank(&addr);
      if self.banks[flat].pim_held {
        continue;
      }

      let wanted = if trans.is_write {
        CommandType::WritePrecharge
      } else {
        CommandType::ReadPrecharge
      };
      let ready = self.get_ready_command(&Command::new(wanted, addr, trans.addr), now);
      if !ready.is_valid() {
        continue;
      }

      self.apply(&ready, false);
      if ready.cmd_type.is_column() {
        let latency = if trans.is_write {
          self.config.timing.write_latency
        } else {
          self.config.timing.read_latency
        };
        let mut done = trans;
        done.complete_cycle = now + latency;
        self.in_flight.push(done);
        self.trans_queue.remove(i);
      }
      // one command per cycle on the ordinary path
      return;
    }
  }
}

impl Controller for DramController {
  fn channel_id(&self) -> usize {
    self.channel
  }

  fn will_accept_transaction(&self, _hex_addr: u64, _is_write: bool) -> bool {
    self.trans_queue.len() < self.config.dram.trans_queue_size
  }

  fn add_transaction(&mut self, mut trans: Transaction) -> bool {
    if !self.will_accept_transaction(trans.addr, trans.is_write) {
      return false;
    }
    trans.added_cycle = self.clk;
    self.trans_queue.push_back(trans);
    true
  }

  fn return_done_trans(&mut self, clk: u64) -> Option<Transaction> {
    let (i, _) = self
      .in_flight
      .iter()
      .enumerate()
      .filter(|(_, t)| t.complete_cycle <= clk)
      .min_by_key(|(_, t)| t.complete_cycle)?;
    Some(self.in_flight.remove(i))
  }

  fn get_ready_command(&self, cmd: &Command, clk: u64) -> Command {
    if self.is_in_refresh() {
      return Command::invalid();
    }
    let bank = &self.banks[self.config.flat_bank(&cmd.addr)];
    let ready_at = |at: u64, ready: Command| if clk >= at { ready } else { Command::invalid() };

    match cmd.cmd_type {
      c if c.is_activate() => match bank.open_row {
        Some(_) => ready_at(bank.pre_ready, cmd.retyped(CommandType::Precharge)),
        None if self.refresh_imminent() => Command::invalid(),
        None => ready_at(bank.act_ready, *cmd),
      },
      c if c.is_column() => match bank.open_row {
        None if self.refresh_imminent() => Command::invalid(),
        None => ready_at(bank.act_ready, cmd.retyped(CommandType::Activate)),
        Some(row) if row != cmd.addr.row => ready_at(bank.pre_ready, cmd.retyped(CommandType::Precharge)),
        Some(_) => ready_at(self.column_ready(bank, c), *cmd),
      },
      CommandType::Precharge => match bank.open_row {
        Some(_) => ready_at(bank.pre_ready, *cmd),
        None => Command::invalid(),
      },
      _ => Command::invalid(),
    }
  }

  fn is_in_refresh(&self) -> bool {
    self.clk < self.refresh_until
  }

  fn refresh_imminent(&self) -> bool {
    !self.is_in_refresh() && self.next_refresh.saturating_sub(self.clk) <= self.config.pim.refresh_guard
  }

  fn push_pim_command(&mut self, queue: PimQueue, cmd: Command, release: u64) {
    self.pim_queues[queue.index()].push_back((cmd, release));
  }

  fn pending_pim(&self) -> usize {
    self.pim_queues.iter().map(|q| q.len()).sum()
  }

  fn clock_tick(&mut self) {
    if self.clk >= self.next_refresh && !self.is_in_refresh() {
      self.start_refresh();
    }
    if !self.is_in_refresh() {
      let pim_busy = self.issue_pim();
      if !pim_busy {
        self.issue_ordinary();
      }
    }
    self.clk += 1;
  }

  fn is_idle(&self) -> bool {
    self.trans_queue.is_empty() && self.in_flight.is_empty()
  }
}
