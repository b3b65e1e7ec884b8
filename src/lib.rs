pub mod config;
pub mod dashboard;
pub mod device;
pub mod sim;
