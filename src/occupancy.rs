use crate::controller::Controller;
use crate::error::{PimError, Result};

/// Which (channel, bank) pairs are held open by a PIM operation
#[derive(Debug, Clone)]
pub struct BankOccupancy {
  grid: Vec<Vec<bool>>,
}

impl BankOccupancy {
  pub fn new(channels: usize, banks: usize) -> Self {
    Self {
      grid: vec![vec![false; banks]; channels],
    }
  }

  pub fn is_bank_free(&self, channel: usize, bank: usize) -> bool {
    !self.grid[channel][bank]
  }

  pub fn all_free(&self, targets: &[(usize, usize)]) -> bool {
    targets.iter().all(|&(ch, bank)| self.is_bank_free(ch, bank))
  }

  pub fn acquire(&mut self, channel: usize, bank: usize) -> Result<()> {
    let slot = &mut self.grid[channel][bank];
    if *slot {
      return Err(PimError::BankHeld { channel, bank });
    }
    *slot = true;
    Ok(())
  }

  pub fn release(&mut self, channel: usize, bank: usize) -> Result<()> {
    let slot = &mut self.grid[channel][bank];
    if !*slot {
      return Err(PimError::BankNotHeld { channel, bank });
    }
    *slot = false;
    Ok(())
  }

  pub fn held_count(&self) -> usize {
    self.grid.iter().flatten().filter(|held| **held).count()
  }
}

/// Refresh state of every channel, sampled once per cycle
#[derive(Debug, Clone, Default)]
pub struct RefreshGate {
  pending: Vec<bool>,
}

impl RefreshGate {
  pub fn new(channels: usize) -> Self {
    Self {
      pending: vec![false; channels],
    }
  }

  pub fn poll<C: Controller>(&mut self, ctrls: &[C]) {
    for (slot, ctrl) in self.pending.iter_mut().zip(ctrls) {
      *slot = ctrl.refresh_imminent() || ctrl.is_in_refresh();
    }
  }

  pub fn refresh_imminent_or_active(&self, channel: usize) -> bool {
    self.pending[channel]
  }

  /// New PIM activates are held back while any channel is near a refresh
  pub fn blocks_activates(&self) -> bool {
    self.pending.iter().any(|p| *p)
  }
}
