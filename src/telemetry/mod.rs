pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

pub fn init() -> LogCtx<ops::init::Init> { LogCtx::new(config::logs_are_json()) }
pub fn source() -> LogCtx<ops::source::Source> { LogCtx::new(config::logs_are_json()) }
pub fn poll() -> LogCtx<ops::poll::Poll> { LogCtx::new(config::logs_are_json()) }
