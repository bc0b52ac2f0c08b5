pub mod config;
pub mod design;
pub mod error;
pub mod event;
pub mod lineup;
pub mod metric;
pub mod pipeline;
pub mod possession;
pub mod ratings;
pub mod ridge;
pub mod stint;
pub mod synthetic;
pub mod tables;
