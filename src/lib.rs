// Public API for integration tests and potential library usage

pub mod codes;
pub mod config;
pub mod device;
pub mod error;
pub mod roster;
pub mod round;
pub mod session;
pub mod store;
pub mod types;
pub mod ui;
pub mod watch;
pub mod words;
