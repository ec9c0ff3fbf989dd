//! S3 compatible object storage driver / S3对象存储驱动

pub mod config;
mod driver;
mod factory;
mod types;

pub use config::{S3Config, S3Credentials, MIN_PART_SIZE};
pub use driver::S3Backend;
pub use factory::S3DriverFactory;
