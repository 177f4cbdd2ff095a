use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io;

use crate::error::Result;

pub enum ShellCommand {
  Step(u64), // Step N cycles
  Quit,
  Continue,
}

/// Interactive stepping prompt
pub struct Shell {
  editor: DefaultEditor,
}

impl Shell {
  pub fn new() -> Result<Self> {
    let editor = DefaultEditor::new().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(Self { editor })
  }

  pub fn read_command(&mut self, clk: u64) -> Result<ShellCommand> {
    loop {
      match self.editor.readline(&format!("(pimsim {}) ", clk)) {
        Ok(line) => {
          let trimmed = line.trim();
          if !trimmed.is_empty() {
            let _ = self.editor.add_history_entry(trimmed);
          }
          match parse_command(trimmed) {
            Ok(cmd) => return Ok(cmd),
            Err(msg) => eprintln!("Error: {}", msg),
          }
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(ShellCommand::Quit),
        Err(err) => return Err(io::Error::new(io::ErrorKind::Other, err).into()),
      }
    }
  }
}

/// Enter steps one cycle, `si N` steps N, `c` continues, `q` quits
pub fn parse_command(line: &str) -> std::result::Result<ShellCommand, String> {
  if line.is_empty() {
    return Ok(ShellCommand::Step(1));
  }
  if let Some(num) = line.strip_prefix("si") {
    let num = num.trim();
    if num.is_empty() {
      return Err("'si' requires a number, e.g., 'si 100'".to_string());
    }
    return match num.parse::<u64>() {
      Ok(n) if n > 0 => Ok(ShellCommand::Step(n)),
      Ok(_) => Err("step count must be greater than 0".to_string()),
      Err(e) => Err(format!("invalid number '{}': {}", num, e)),
    };
  }
  match line {
    "q" => Ok(ShellCommand::Quit),
    "c" => Ok(ShellCommand::Continue),
    other => Err(format!(
      "unknown command '{}'. Use Enter to step, 'q' to quit, 'c' to continue, or 'si 100' to step N cycles",
      other
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_step_commands() {
    assert!(matches!(parse_command(""), Ok(ShellCommand::Step(1))));
    assert!(matches!(parse_command("si 100"), Ok(ShellCommand::Step(100))));
    assert!(matches!(parse_command("c"), Ok(ShellCommand::Continue)));
    assert!(matches!(parse_command("q"), Ok(ShellCommand::Quit)));
    assert!(parse_command("si").is_err());
    assert!(parse_command("si 0").is_err());
    assert!(parse_command("run").is_err());
  }
}
