//! Logger setup. `RUST_LOG` wins over the defaults below.

use env_logger::{Builder, Env};

/// Default level is `info`, `warn` in quiet mode. Safe to call more than once.
pub fn init_log(quiet: bool) {
  let level = if quiet { "warn" } else { "info" };
  let _ = Builder::from_env(Env::default().default_filter_or(level))
    .format_timestamp(None)
    .try_init();
}
