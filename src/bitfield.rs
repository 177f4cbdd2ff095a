//! Instruction words are packed LSB-first from fixed (name, width) tables.
//! Field order and widths are wire format: producers of PIM trace addresses
//! depend on them.

/// One packed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
  pub name: &'static str,
  pub width: u32,
}

const fn f(name: &'static str, width: u32) -> BitField {
  BitField { name, width }
}

/// bit 0 set: start computation on the masked cuts
pub const LAUNCH: &[BitField] = &[f("flag", 1), f("cut_mask", 63)];

/// bits 5 and 6 set: cut counts, multiplexing factors, dataflow, tile size
pub const DATAFLOW: &[BitField] = &[
  f("flag", 1),
  f("reserved", 4),
  f("class", 2),
  f("vcuts_log2", 3),
  f("hcuts_log2", 1),
  f("mcf_log2", 3),
  f("ucf_log2", 3),
  f("dataflow", 1),
  f("tile_m_log2", 5),
  f("vcuts_next_log2", 3),
  f("hcuts_next_log2", 1),
  f("kernel_size", 4),
  f("stride", 4),
];

/// everything else: one dimension and base row of one cut
pub const WORKLOAD: &[BitField] = &[
  f("flag", 1),
  f("cut", 4),
  f("load_type", 2),
  f("dim", 32),
  f("base_row", 25),
];

fn mask(width: u32) -> u64 {
  if width >= 64 {
    u64::MAX
  } else {
    (1u64 << width) - 1
  }
}

/// Field values of one word, in table order
#[derive(Debug, Clone)]
pub struct Fields {
  table: &'static [BitField],
  values: Vec<u64>,
}

impl Fields {
  /// Panics when `name` is not part of the table; that is a table/decoder mismatch.
  pub fn get(&self, name: &str) -> u64 {
    match self.table.iter().position(|field| field.name == name) {
      Some(i) => self.values[i],
      None => panic!("bit field '{}' not in table", name),
    }
  }
}

/// Consumes fields from the low end of a word
pub struct BitReader {
  word: u64,
  pos: u32,
}

impl BitReader {
  pub fn new(word: u64) -> Self {
    Self { word, pos: 0 }
  }

  pub fn take(&mut self, width: u32) -> u64 {
    let value = if self.pos >= 64 { 0 } else { (self.word >> self.pos) & mask(width) };
    self.pos += width;
    value
  }

  pub fn position(&self) -> u32 {
    self.pos
  }
}

pub fn unpack(word: u64, table: &'static [BitField]) -> Fields {
  let mut reader = BitReader::new(word);
  let values = table.iter().map(|field| reader.take(field.width)).collect();
  Fields { table, values }
}

/// Build a word from named values; missing fields are zero, values are truncated.
pub fn pack(table: &[BitField], values: &[(&str, u64)]) -> u64 {
  let mut word = 0u64;
  let mut pos = 0u32;
  for field in table {
    if let Some((_, value)) = values.iter().find(|(name, _)| *name == field.name) {
      if pos < 64 {
        word |= (value & mask(field.width)) << pos;
      }
    }
    pos += field.width;
  }
  word
}

pub fn table_width(table: &[BitField]) -> u32 {
  table.iter().map(|field| field.width).sum()
}
