use crate::command::Transaction;
use crate::config::Config;
use crate::controller::Controller;
use crate::error::{PimError, Result};

/// Ordinary reads and writes go straight to the channel their address maps to
pub fn channel_of(config: &Config, hex_addr: u64) -> usize {
  config.channel_of(hex_addr)
}

pub fn will_accept<C: Controller>(ctrls: &[C], config: &Config, hex_addr: u64, is_write: bool) -> bool {
  ctrls[channel_of(config, hex_addr)].will_accept_transaction(hex_addr, is_write)
}

/// Callers are expected to check `will_accept` first; a full queue is fatal
pub fn add<C: Controller>(ctrls: &mut [C], config: &Config, trans: Transaction) -> Result<()> {
  let channel = channel_of(config, trans.addr);
  if !ctrls[channel].add_transaction(trans) {
    return Err(PimError::TransactionRejected {
      channel,
      addr: trans.addr,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::command::Address;
  use crate::controller::DramController;

  #[test]
  fn transactions_land_on_their_channel() {
    let config = Config::default();
    let mut ctrls: Vec<_> = (0..config.channels()).map(|ch| DramController::new(ch, &config)).collect();
    let addr = config.address_unmapping(&Address {
      channel: 6,
      row: 3,
      ..Address::default()
    });
    assert_eq!(channel_of(&config, addr), 6);
    assert!(will_accept(&ctrls, &config, addr, true));
    add(&mut ctrls, &config, Transaction::new(addr, true, 0)).unwrap();
    assert!(!ctrls[6].is_idle());
    assert!(ctrls[0].is_idle());
  }

  #[test]
  fn full_channel_rejects() {
    let mut config = Config::default();
    config.dram.trans_queue_size = 1;
    let mut ctrls: Vec<_> = (0..config.channels()).map(|ch| DramController::new(ch, &config)).collect();
    add(&mut ctrls, &config, Transaction::new(0, false, 0)).unwrap();
    assert!(!will_accept(&ctrls, &config, 0, false));
    let err = add(&mut ctrls, &config, Transaction::new(0, false, 0)).unwrap_err();
    assert!(matches!(err, PimError::TransactionRejected { channel: 0, addr: 0 }));
  }
}
