use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical DRAM coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
  pub channel: usize,
  pub rank: usize,
  pub bankgroup: usize,
  pub bank: usize,
  pub row: u32,
  pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
  Read,
  ReadPrecharge,
  Write,
  WritePrecharge,
  Activate,
  Precharge,
  Refresh,
  LocalRead,
  LocalReadPrecharge,
  GlobalRead,
  GlobalReadPrecharge,
  PimWrite,
  PimWritePrecharge,
  PimActivate,
  Invalid,
}

impl CommandType {
  pub fn is_read(self) -> bool {
    matches!(
      self,
      CommandType::Read
        | CommandType::ReadPrecharge
        | CommandType::LocalRead
        | CommandType::LocalReadPrecharge
        | CommandType::GlobalRead
        | CommandType::GlobalReadPrecharge
    )
  }

  pub fn is_write(self) -> bool {
    matches!(
      self,
      CommandType::Write | CommandType::WritePrecharge | CommandType::PimWrite | CommandType::PimWritePrecharge
    )
  }

  pub fn is_column(self) -> bool {
    self.is_read() || self.is_write()
  }

  pub fn is_activate(self) -> bool {
    matches!(self, CommandType::Activate | CommandType::PimActivate)
  }

  /// Commands that leave the bank closed
  pub fn closes_bank(self) -> bool {
    matches!(
      self,
      CommandType::ReadPrecharge
        | CommandType::WritePrecharge
        | CommandType::LocalReadPrecharge
        | CommandType::GlobalReadPrecharge
        | CommandType::PimWritePrecharge
        | CommandType::Precharge
    )
  }

  /// Column command of the same flavour that also precharges
  pub fn with_precharge(self) -> CommandType {
    match self {
      CommandType::Read => CommandType::ReadPrecharge,
      CommandType::Write => CommandType::WritePrecharge,
      CommandType::LocalRead => CommandType::LocalReadPrecharge,
      CommandType::GlobalRead => CommandType::GlobalReadPrecharge,
      CommandType::PimWrite => CommandType::PimWritePrecharge,
      other => other,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      CommandType::Read => "read",
      CommandType::ReadPrecharge => "read_p",
      CommandType::Write => "write",
      CommandType::WritePrecharge => "write_p",
      CommandType::Activate => "activate",
      CommandType::Precharge => "precharge",
      CommandType::Refresh => "refresh",
      CommandType::LocalRead => "lh_read",
      CommandType::LocalReadPrecharge => "lh_read_p",
      CommandType::GlobalRead => "gh_read",
      CommandType::GlobalReadPrecharge => "gh_read_p",
      CommandType::PimWrite => "pim_write",
      CommandType::PimWritePrecharge => "pim_write_p",
      CommandType::PimActivate => "pim_activate",
      CommandType::Invalid => "WRONG",
    }
  }
}

impl fmt::Display for CommandType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A command aimed at one bank. `Invalid` means "not issuable this cycle".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
  pub cmd_type: CommandType,
  pub addr: Address,
  /// physical address the command was built for
  pub hex_addr: u64,
}

impl Command {
  pub fn new(cmd_type: CommandType, addr: Address, hex_addr: u64) -> Self {
    Self {
      cmd_type,
      addr,
      hex_addr,
    }
  }

  pub fn invalid() -> Self {
    Self {
      cmd_type: CommandType::Invalid,
      addr: Address::default(),
      hex_addr: 0,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.cmd_type != CommandType::Invalid
  }

  pub fn channel(&self) -> usize {
    self.addr.channel
  }

  /// Same target, different type
  pub fn retyped(&self, cmd_type: CommandType) -> Self {
    Self { cmd_type, ..*self }
  }
}

impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{:<20} {:>3} {:>3} {:>3} {:>3} {:>#8x} {:>#8x}",
      self.cmd_type.name(),
      self.addr.channel,
      self.addr.rank,
      self.addr.bankgroup,
      self.addr.bank,
      self.addr.row,
      self.addr.column
    )
  }
}

/// A host request. PIM transactions carry an instruction word in `addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
  pub addr: u64,
  pub is_write: bool,
  pub is_pim: bool,
  pub added_cycle: u64,
  pub complete_cycle: u64,
}

impl Transaction {
  pub fn new(addr: u64, is_write: bool, added_cycle: u64) -> Self {
    Self {
      addr,
      is_write,
      is_pim: false,
      added_cycle,
      complete_cycle: 0,
    }
  }

  pub fn pim(addr: u64, added_cycle: u64) -> Self {
    Self {
      addr,
      is_write: false,
      is_pim: true,
      added_cycle,
      complete_cycle: 0,
    }
  }
}

impl fmt::Display for Transaction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = if self.is_pim {
      "PIM"
    } else if self.is_write {
      "WRITE"
    } else {
      "READ"
    };
    write!(f, "{:<30} {:>8}", self.addr, kind)
  }
}
