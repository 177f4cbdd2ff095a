use pimsim::config::load_app_config;
#[cfg(feature = "smoke-tests")]
use pimsim::logging::init_log;
#[cfg(feature = "smoke-tests")]
use pimsim::simulator::Simulator;
use pimsim::trace::load_trace;
use std::path::PathBuf;

fn workspace_file(rel: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

#[test]
#[cfg(feature = "smoke-tests")]
fn four_cut_trace_runs_to_completion() {
  init_log(true);
  let mut app = load_app_config(Some(workspace_file("configs/default.toml").as_path())).unwrap();
  let records = std::env::temp_dir().join("pimsim_smoke_records.jsonl");
  app.simulation.record_file = records.to_string_lossy().to_string();

  let trace = load_trace(workspace_file("traces/gemm_4cut.trc").as_path()).unwrap();
  let mut sim = Simulator::new(&app, trace).unwrap();
  let end = sim.run().unwrap();

  assert!(end < app.simulation.cycles, "hit the cycle limit");
  assert!(sim.system().is_idle());
  assert!(sim.system().powered_down());

  let lines = std::fs::read_to_string(&records).unwrap();
  let finished = lines
    .lines()
    .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
    .filter(|v| v["event"] == "partition_idle")
    .count();
  assert_eq!(finished, 4);
}

#[test]
fn default_config_file_matches_built_in_defaults() {
  let app = load_app_config(Some(workspace_file("configs/default.toml").as_path())).unwrap();
  let built_in = pimsim::Config::default();
  assert_eq!(app.dram.channels, built_in.dram.channels);
  assert_eq!(app.timing.trefi, built_in.timing.trefi);
  assert_eq!(app.pim.refresh_guard, built_in.pim.refresh_guard);
  assert_eq!(app.simulation.cycles, 200_000);
}

#[test]
fn sample_trace_parses() {
  let trace = load_trace(workspace_file("traces/gemm_4cut.trc").as_path()).unwrap();
  assert_eq!(trace.len(), 18);
}
