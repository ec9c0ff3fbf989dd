//! rangefs: concurrent byte-range reads, listings and multipart writes over object stores
//! (S3, GCS, Azure Blob, plain HTTP) behind one filesystem-style interface.

pub mod blocking;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod metadata;
pub mod retry;
pub mod storage;
pub mod upload;
pub mod utils;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use blocking::{BlockingFileSystem, BlockingReader, BlockingWriter};
pub use config::{BackendConfig, ReadAheadMode, DEFAULT_BLOCK_SIZE};
pub use error::{Error, ErrorKind, Result};
pub use fetch::RangeFetcher;
pub use fs::{FileHandle, FileReader, FileSystem};
pub use metadata::MetadataEngine;
pub use retry::RetryPolicy;
pub use storage::{
    BackendBox, BackendRegistry, ByteRange, Capability, CompletedPart, DriverFactory, ListPage,
    ObjectBackend, ObjectInfo, ObjectType, RangeRequest,
};
pub use upload::{UploadSession, UploadState};

/// Install a tracing subscriber (`RUST_LOG` or `rangefs=info`) / 初始化日志
///
/// For binaries and tests; the library itself never installs one. Returns `false` when a
/// global subscriber was already set.
pub fn init_tracing() -> bool {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rangefs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
