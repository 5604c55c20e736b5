pub mod command;
pub mod info;
pub mod process;
