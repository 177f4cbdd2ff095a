use log::trace;

use crate::command::{Command, CommandType};
use crate::config::Config;
use crate::controller::{Controller, PimQueue};
use crate::scheduler::Retry;

/// Commands of one sub-pipeline step, one per target (channel, bank).
/// A batch is issued whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
  pub queue: PimQueue,
  pub commands: Vec<Command>,
}

impl CommandBatch {
  pub fn cmd_type(&self) -> CommandType {
    self.commands.first().map_or(CommandType::Invalid, |c| c.cmd_type)
  }

  pub fn len(&self) -> usize {
    self.commands.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }
}

/// Ask every target channel whether its candidate may go this cycle.
///
/// Any candidate that is not issuable, or that the controller answers with a
/// different command type, discards the whole batch.
pub fn build_batch<C: Controller>(
  ctrls: &[C],
  queue: PimQueue,
  candidates: Vec<Command>,
  clk: u64,
) -> Result<CommandBatch, Retry> {
  let wanted = match candidates.first() {
    Some(first) => first.cmd_type,
    None => return Err(Retry::NotReady),
  };

  for cand in candidates.iter() {
    let ready = ctrls[cand.channel()].get_ready_command(cand, clk);
    if !ready.is_valid() {
      return Err(Retry::NotReady);
    }
    if ready.cmd_type != wanted || cand.cmd_type != wanted {
      trace!("mixed batch: wanted {} got {} on ch{}", wanted, ready.cmd_type, cand.channel());
      return Err(Retry::Mixed);
    }
  }

  Ok(CommandBatch {
    queue,
    commands: candidates,
  })
}

/// Cycle from which a queued command may issue
pub fn release_cycle(queue: PimQueue, clk: u64, config: &Config) -> u64 {
  match queue {
    PimQueue::Input => clk + config.pim.input_release_delay,
    _ => clk,
  }
}

/// Append accepted batches to their channels' PIM queues; returns commands pushed
pub fn dispatch<C: Controller>(ctrls: &mut [C], batches: &[CommandBatch], clk: u64, config: &Config) -> usize {
  let mut pushed = 0;
  for batch in batches {
    let release = release_cycle(batch.queue, clk, config);
    for cmd in batch.commands.iter() {
      ctrls[cmd.channel()].push_pim_command(batch.queue, *cmd, release);
      pushed += 1;
    }
    trace!("clk {} {:?} <- {} x{}", clk, batch.queue, batch.cmd_type(), batch.len());
  }
  pushed
}
