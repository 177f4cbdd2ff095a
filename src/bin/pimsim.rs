use clap::Parser;
use pimsim::config::load_app_config;
use pimsim::logging::init_log;
use pimsim::simulator::Simulator;
use pimsim::trace::load_trace;
use std::path::PathBuf;
use std::process::ExitCode;

/// pimsim - cycle-level DRAM simulator with a PIM GEMM scheduler
#[derive(Parser, Debug)]
#[command(name = "pimsim")]
#[command(version = "0.1.0")]
#[command(about = "Trace-driven DRAM + PIM scheduler simulator", long_about = None)]
struct Args {
  /// TOML configuration file
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Trace file of `<hex addr> <READ|WRITE|PIM> <cycle>` lines
  #[arg(short, long, value_name = "FILE")]
  trace: Option<PathBuf>,

  /// Stop after this many cycles (0 runs until the trace drains)
  #[arg(short, long, value_name = "CYCLES")]
  cycles: Option<u64>,

  /// Enable step mode (interactive stepping)
  #[arg(short, long)]
  step: bool,

  /// Quiet mode (warnings and errors only)
  #[arg(short, long)]
  quiet: bool,

  /// Write PIM event records as JSON lines
  #[arg(long, value_name = "FILE")]
  record_file: Option<String>,
}

fn run(args: Args) -> pimsim::Result<()> {
  let mut app = load_app_config(args.config.as_deref())?;
  if let Some(cycles) = args.cycles {
    app.simulation.cycles = cycles;
  }
  if let Some(record_file) = args.record_file {
    app.simulation.record_file = record_file;
  }
  app.simulation.step_mode |= args.step;
  app.simulation.quiet |= args.quiet;

  init_log(app.simulation.quiet);

  let trace = match args.trace.as_deref() {
    Some(path) => load_trace(path)?,
    None => Vec::new(),
  };
  let mut simulator = Simulator::new(&app, trace)?;
  simulator.run()?;
  Ok(())
}

fn main() -> ExitCode {
  let args = Args::parse();
  match run(args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("pimsim: {}", e);
      ExitCode::FAILURE
    }
  }
}
