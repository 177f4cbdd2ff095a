use serde::Serialize;

use crate::command::CommandType;
use crate::controller::PimQueue;
use crate::decoder::LoadType;

/// Push a `Record` for the current cycle when recording is enabled
///
/// Usage:
/// ```ignore
/// pim_record!(self.records, self.clk, Some(cut), PimEvent::Launched);
/// ```
#[macro_export]
macro_rules! pim_record {
  ($records:expr, $cycle:expr, $cut:expr, $event:expr) => {
    $records.push($crate::record::Record {
      cycle: $cycle,
      cut: $cut,
      event: $event,
    })
  };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PimEvent {
  Reconfigured { cuts: usize, tile_m: usize, dataflow: u8 },
  WorkloadLoaded { load: LoadType, dim: u64 },
  Launched,
  WeightLoaded { k: u64, n: u64 },
  TileStreamed { m: u64, n: u64, k: u64 },
  ComputeFinished,
  OutputWritten { m: u64, n: u64 },
  PartitionIdle,
  PoweredDown,
  BatchDispatched { queue: PimQueue, cmd: CommandType, targets: usize, row: u64, col: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
  pub cycle: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cut: Option<usize>,
  #[serde(flatten)]
  pub event: PimEvent,
}

impl Record {
  pub fn to_json_line(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }
}

/// Event log shared by the decoder and scheduler
#[derive(Debug, Clone, Default)]
pub struct Records {
  enabled: bool,
  entries: Vec<Record>,
}

impl Records {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      entries: Vec::new(),
    }
  }

  pub fn push(&mut self, record: Record) {
    if self.enabled {
      self.entries.push(record);
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &Record> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Hand the buffered records to a writer and start over
  pub fn drain(&mut self) -> std::vec::Drain<'_, Record> {
    self.entries.drain(..)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_line_flattens_the_event() {
    let record = Record {
      cycle: 12,
      cut: Some(1),
      event: PimEvent::TileStreamed { m: 0, n: 1, k: 2 },
    };
    let value: serde_json::Value = serde_json::from_str(&record.to_json_line()).unwrap();
    assert_eq!(value["cycle"], 12);
    assert_eq!(value["cut"], 1);
    assert_eq!(value["event"], "tile_streamed");
    assert_eq!(value["k"], 2);
  }

  #[test]
  fn disabled_log_stays_empty() {
    let mut records = Records::new(false);
    pim_record!(records, 0, None, PimEvent::PoweredDown);
    assert!(records.is_empty());

    let mut records = Records::new(true);
    pim_record!(records, 3, None, PimEvent::PoweredDown);
    assert_eq!(records.len(), 1);
    assert_eq!(records.drain().count(), 1);
    assert!(records.is_empty());
  }
}
