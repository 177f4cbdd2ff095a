use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::error::{PimError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceKind {
  Read,
  Write,
  /// the address is a PIM instruction word
  Pim,
}

impl TraceKind {
  fn parse(op: &str) -> Self {
    match op {
      "WRITE" | "write" | "P_MEM_WR" | "BOFF" => TraceKind::Write,
      "PIM" => TraceKind::Pim,
      _ => TraceKind::Read,
    }
  }
}

/// One `<hex addr> <op> <cycle>` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
  pub addr: u64,
  pub kind: TraceKind,
  pub cycle: u64,
}

/// Blank lines and `#` comments yield `None`
pub fn parse_line(line: &str, lineno: usize) -> Result<Option<TraceEntry>> {
  let line = line.trim();
  if line.is_empty() || line.starts_with('#') {
    return Ok(None);
  }
  let err = |msg: String| PimError::Trace { line: lineno, msg };

  let mut parts = line.split_whitespace();
  let (Some(addr), Some(op), Some(cycle)) = (parts.next(), parts.next(), parts.next()) else {
    return Err(err(format!("expected '<addr> <op> <cycle>', got '{}'", line)));
  };
  let digits = addr.trim_start_matches("0x").trim_start_matches("0X");
  let addr = u64::from_str_radix(digits, 16).map_err(|e| err(format!("bad address '{}': {}", addr, e)))?;
  let cycle = cycle
    .parse::<u64>()
    .map_err(|e| err(format!("bad cycle '{}': {}", cycle, e)))?;

  Ok(Some(TraceEntry {
    addr,
    kind: TraceKind::parse(op),
    cycle,
  }))
}

pub fn parse_trace(content: &str) -> Result<Vec<TraceEntry>> {
  let mut entries = Vec::new();
  for (i, line) in content.lines().enumerate() {
    if let Some(entry) = parse_line(line, i + 1)? {
      entries.push(entry);
    }
  }
  Ok(entries)
}

pub fn load_trace(path: &Path) -> Result<Vec<TraceEntry>> {
  let content = fs::read_to_string(path)?;
  parse_trace(&content)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_all_op_spellings() {
    let entries = parse_trace(
      "# header\n\
       0x1f40 READ 0\n\
       1f60 P_MEM_WR 3\n\
       \n\
       0x61 PIM 3\n\
       0x80 BOFF 9\n\
       0x100 P_FETCH 10\n",
    )
    .unwrap();
    let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(
      kinds,
      vec![TraceKind::Read, TraceKind::Write, TraceKind::Pim, TraceKind::Write, TraceKind::Read]
    );
    assert_eq!(entries[1].addr, 0x1f60);
    assert_eq!(entries[2].cycle, 3);
  }

  #[test]
  fn reports_the_bad_line() {
    let err = parse_trace("0x10 READ 0\nzz READ 1\n").unwrap_err();
    assert!(matches!(err, PimError::Trace { line: 2, .. }));
    let err = parse_trace("0x10 READ\n").unwrap_err();
    assert!(matches!(err, PimError::Trace { line: 1, .. }));
  }
}
