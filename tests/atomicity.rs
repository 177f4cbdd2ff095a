mod common;

use common::*;
use pimsim::command::CommandType;
use pimsim::Config;

fn launched() -> (pimsim::MemorySystem<ScriptedController>, PushLog) {
  let (mut sys, log) = scripted_system(Config::default());
  submit(&mut sys, &[dataflow_word(0, 0, 2, 0)]);
  submit(&mut sys, &gemm_words(0, 4, 2, 8));
  submit(&mut sys, &[launch_word(1)]);
  (sys, log)
}

#[test]
fn one_unready_channel_blocks_the_whole_batch() {
  let (mut sys, log) = launched();
  sys.controllers_mut()[5].refuse = true;
  for _ in 0..40 {
    sys.clock_tick().unwrap();
  }
  assert!(log.borrow().is_empty());
  assert_eq!(sys.occupancy().held_count(), 0);
  assert!(sys.partitions().get(0).unwrap().active);

  sys.controllers_mut()[5].refuse = false;
  run_until_idle(&mut sys, 1000);
  assert_eq!(tiles_streamed(&sys, 0).len(), 1);
}

#[test]
fn mixed_answers_discard_the_batch() {
  let (mut sys, log) = launched();
  sys.controllers_mut()[2].answer_with = Some(CommandType::Precharge);
  for _ in 0..40 {
    sys.clock_tick().unwrap();
  }
  assert!(log.borrow().is_empty());

  sys.controllers_mut()[2].answer_with = None;
  run_until_idle(&mut sys, 1000);
  assert!(!log.borrow().is_empty());
}

#[test]
fn data_step_failure_keeps_the_bank_held() {
  let (mut sys, log) = launched();
  while sys.occupancy().held_count() == 0 {
    sys.clock_tick().unwrap();
  }
  let held = sys.occupancy().held_count();
  let pushed = log.borrow().len();

  sys.controllers_mut()[7].refuse = true;
  for _ in 0..10 {
    sys.clock_tick().unwrap();
    assert_grid_consistent(&sys);
  }
  assert_eq!(log.borrow().len(), pushed);
  assert_eq!(sys.occupancy().held_count(), held);
  assert!(sys.partitions().get(0).unwrap().weight.act_placed);
}
