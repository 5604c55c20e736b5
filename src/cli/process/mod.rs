mod process_impl;
pub mod progress;
pub mod report;
pub mod stage;

pub use process_impl::cmd_process;
