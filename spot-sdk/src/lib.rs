#![warn(missing_debug_implementations, rust_2018_idioms)]

mod error;
mod estop;
mod lease;
mod robot;
mod time_sync;
mod utils;
pub mod wire;

pub use crate::{error::*, estop::*, lease::*, robot::*, time_sync::*};
