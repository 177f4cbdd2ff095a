//! Trace-driven driver: feeds trace entries into the memory system at their
//! cycle and clocks it until the trace drains or the cycle limit is hit.

use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::config::{AppConfig, SimulationSection};
use crate::error::Result;
use crate::shell::{Shell, ShellCommand};
use crate::system::MemorySystem;
use crate::trace::{TraceEntry, TraceKind};

pub struct Simulator {
  system: MemorySystem,
  trace: Vec<TraceEntry>,
  next: usize,
  settings: SimulationSection,
  record_out: Option<BufWriter<File>>,
}

impl Simulator {
  pub fn new(app: &AppConfig, trace: Vec<TraceEntry>) -> Result<Self> {
    let system = MemorySystem::new(app.config())?;
    let record_out = if app.simulation.record_file.is_empty() {
      None
    } else {
      Some(BufWriter::new(File::create(&app.simulation.record_file)?))
    };
    Ok(Self {
      system,
      trace,
      next: 0,
      settings: app.simulation.clone(),
      record_out,
    })
  }

  /// Run to completion; returns the final cycle
  pub fn run(&mut self) -> Result<u64> {
    if self.settings.step_mode {
      self.run_step_mode()?;
    } else {
      self.run_continuous()?;
    }
    if let Some(out) = self.record_out.as_mut() {
      out.flush()?;
    }
    info!(
      "stopped at clk {}: {}/{} trace entries admitted, array {}",
      self.system.clk(),
      self.next,
      self.trace.len(),
      if self.system.powered_down() { "powered down" } else { "active" }
    );
    Ok(self.system.clk())
  }

  fn run_continuous(&mut self) -> Result<()> {
    while !self.is_done() {
      self.step()?;
    }
    Ok(())
  }

  fn run_step_mode(&mut self) -> Result<()> {
    println!("Step mode - Enter steps one cycle, 'si N' steps N, 'c' continues, 'q' quits");
    let mut shell = Shell::new()?;
    while !self.is_done() {
      match shell.read_command(self.system.clk())? {
        ShellCommand::Step(n) => {
          for _ in 0..n {
            if self.is_done() {
              break;
            }
            self.step()?;
          }
        }
        ShellCommand::Continue => return self.run_continuous(),
        ShellCommand::Quit => break,
      }
    }
    Ok(())
  }

  /// Admit due trace entries, then advance one cycle
  pub fn step(&mut self) -> Result<()> {
    self.admit()?;
    self.system.clock_tick()?;
    self.write_records()
  }

  fn admit(&mut self) -> Result<()> {
    let clk = self.system.clk();
    while let Some(entry) = self.trace.get(self.next) {
      if entry.cycle > clk {
        break;
      }
      match entry.kind {
        TraceKind::Pim => {
          if !self.system.will_accept_pim() {
            break;
          }
          self.system.add_pim_transaction(entry.addr)?;
        }
        kind => {
          let is_write = kind == TraceKind::Write;
          if !self.system.will_accept_transaction(entry.addr, is_write) {
            break;
          }
          self.system.add_transaction(entry.addr, is_write)?;
        }
      }
      self.next += 1;
    }
    Ok(())
  }

  fn write_records(&mut self) -> Result<()> {
    let records = self.system.records_mut().drain();
    let Some(out) = self.record_out.as_mut() else {
      return Ok(());
    };
    for record in records {
      writeln!(out, "{}", record.to_json_line())?;
    }
    Ok(())
  }

  pub fn is_done(&self) -> bool {
    if self.settings.cycles > 0 && self.system.clk() >= self.settings.cycles {
      return true;
    }
    self.next == self.trace.len() && self.system.is_idle()
  }

  pub fn system(&self) -> &MemorySystem {
    &self.system
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::trace::parse_trace;

  #[test]
  fn ordinary_trace_drains() {
    let trace = parse_trace("0x4000 READ 0\n0x8020 WRITE 2\n0xc040 READ 5\n").unwrap();
    let mut sim = Simulator::new(&AppConfig::default(), trace).unwrap();
    let end = sim.run().unwrap();
    assert!(end > 5 && end < 500);
    assert!(sim.system().is_idle());
  }

  #[test]
  fn cycle_limit_stops_the_run() {
    let mut app = AppConfig::default();
    app.simulation.cycles = 3;
    let trace = parse_trace("0x4000 READ 100\n").unwrap();
    let mut sim = Simulator::new(&app, trace).unwrap();
    assert_eq!(sim.run().unwrap(), 3);
  }
}
