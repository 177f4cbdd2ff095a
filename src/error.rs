use thiserror::Error;

/// Fatal conditions. Anything that can be retried next cycle is not an error.
#[derive(Debug, Error)]
pub enum PimError {
  #[error("unknown load type {0} in workload instruction")]
  UnknownLoadType(u64),

  #[error("tile size {tile} exceeds the maximum of {max}")]
  OversizedTile { tile: u64, max: u64 },

  #[error("invalid cut configuration vcuts={vcuts} hcuts={hcuts}: {reason}")]
  InvalidCuts { vcuts: usize, hcuts: usize, reason: String },

  #[error("cut {cut} out of range, {cuts} cuts configured")]
  CutOutOfRange { cut: usize, cuts: usize },

  #[error("row {row:#x} beyond the {rows} rows of a bank")]
  RowOutOfRange { row: u64, rows: u64 },

  #[error("workload instruction {0:#x} arrived before any dataflow configuration")]
  NotConfigured(u64),

  #[error("channel {channel} cannot accept transaction {addr:#x}")]
  TransactionRejected { channel: usize, addr: u64 },

  #[error("PIM instruction queue is full ({depth} entries)")]
  PimQueueFull { depth: usize },

  #[error("bank ({channel},{bank}) acquired while already held")]
  BankHeld { channel: usize, bank: usize },

  #[error("bank ({channel},{bank}) released while free")]
  BankNotHeld { channel: usize, bank: usize },

  #[error("configuration error: {0}")]
  Config(String),

  #[error("trace line {line}: {msg}")]
  Trace { line: usize, msg: String },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for PimError {
  fn from(e: ::config::ConfigError) -> Self {
    PimError::Config(e.to_string())
  }
}

impl From<toml::de::Error> for PimError {
  fn from(e: toml::de::Error) -> Self {
    PimError::Config(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, PimError>;
