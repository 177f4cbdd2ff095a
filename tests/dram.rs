mod common;

use common::*;
use pimsim::command::CommandType;
use pimsim::record::PimEvent;
use pimsim::{Config, MemorySystem, PimQueue};

fn dispatched(sys: &MemorySystem) -> Vec<(PimQueue, CommandType)> {
  sys
    .records()
    .iter()
    .filter_map(|r| match r.event {
      PimEvent::BatchDispatched { queue, cmd, .. } => Some((queue, cmd)),
      _ => None,
    })
    .collect()
}

#[test]
fn small_gemm_against_the_reference_controller() {
  let mut sys = MemorySystem::new(Config::default()).unwrap();
  submit(&mut sys, &[dataflow_word(0, 0, 2, 0)]);
  submit(&mut sys, &gemm_words(0, 4, 2, 8));
  submit(&mut sys, &[launch_word(1)]);
  run_until_idle(&mut sys, 2000);

  let cmds: Vec<CommandType> = dispatched(&sys).into_iter().map(|(_, c)| c).collect();
  assert_eq!(
    cmds,
    vec![
      CommandType::PimActivate,
      CommandType::ReadPrecharge,
      CommandType::PimActivate,
      CommandType::LocalReadPrecharge,
      CommandType::PimActivate,
      CommandType::PimWritePrecharge,
    ]
  );

  let order: Vec<&str> = sys
    .records()
    .iter()
    .filter_map(|r| match r.event {
      PimEvent::WeightLoaded { .. } => Some("weight"),
      PimEvent::TileStreamed { .. } => Some("input"),
      PimEvent::OutputWritten { .. } => Some("output"),
      PimEvent::PoweredDown => Some("off"),
      _ => None,
    })
    .collect();
  assert_eq!(order, vec!["weight", "input", "output", "off"]);
  assert!(sys.powered_down());
  assert!(sys.is_idle());

  // every PIM command reached the banks
  let issued: u64 = sys.controllers().iter().map(|c| c.pim_issued()).sum();
  let per_channel = 2 * sys.config().banks() as u64 + 4;
  assert_eq!(issued, per_channel * sys.config().channels() as u64);
}

#[test]
fn gemm_survives_refresh_windows() {
  let mut config = Config::default();
  config.timing.trefi = 600;
  config.timing.trfc = 60;
  let mut sys = MemorySystem::new(config).unwrap();

  submit(&mut sys, &[dataflow_word(0, 1, 3, 1)]);
  submit(&mut sys, &gemm_words(0, 32, 256, 256));
  submit(&mut sys, &gemm_words(1, 16, 128, 384));
  submit(&mut sys, &[launch_word(0b11)]);
  run_until_idle(&mut sys, 200_000);

  assert!(sys.controllers().iter().all(|c| c.refreshes() > 0));
  assert_eq!(tiles_streamed(&sys, 0).len(), 4 * 2 * 2);
  assert_eq!(tiles_streamed(&sys, 1).len(), 2 * 1 * 3);
  assert_eq!(outputs_written(&sys, 0).len(), 4 * 2);
  assert_eq!(outputs_written(&sys, 1).len(), 2);
  assert_eq!(sys.occupancy().held_count(), 0);
  assert!(sys.powered_down());
}

#[test]
fn ordinary_traffic_shares_the_channels() {
  let config = Config::default();
  let mut sys = MemorySystem::new(config.clone()).unwrap();
  submit(&mut sys, &[dataflow_word(0, 0, 2, 0)]);
  submit(&mut sys, &gemm_words(0, 16, 128, 128));
  submit(&mut sys, &[launch_word(1)]);

  let addrs: Vec<u64> = (0..16u64).map(|i| (i << 13) | (i << 10)).collect();
  for &addr in addrs.iter() {
    assert!(sys.will_accept_transaction(addr, false));
    sys.add_transaction(addr, false).unwrap();
  }

  let start = sys.clk();
  while !sys.is_idle() {
    assert!(sys.clk() - start < 20_000);
    sys.clock_tick().unwrap();
  }
  assert_eq!(outputs_written(&sys, 0).len(), 4);
}
