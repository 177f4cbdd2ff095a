pub mod bitfield;
pub mod command;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod occupancy;
pub mod partition;
pub mod record;
pub mod router;
pub mod scheduler;
pub mod shell;
pub mod simulator;
pub mod system;
pub mod trace;

pub use crate::config::{AppConfig, Config};
pub use crate::controller::{Controller, DramController, PimQueue};
pub use crate::error::{PimError, Result};
pub use crate::system::MemorySystem;
