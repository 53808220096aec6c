mod config;
mod credentials;
mod error;
mod http;
mod logging;
mod poll;
mod progress;
mod response;
mod service;

pub const APP_NAME: &str = "ZipDrop";

pub use config::{
    PollSettings, SETTINGS_FILE_NAME, Settings, config_path, load_settings, parse_settings,
    save_settings, validate_settings,
};
pub use credentials::{
    CredentialProvider, NoCredentials, TOKEN_KEY, TOKEN_STORE_FILE_NAME, TokenStore,
};
pub use error::{Error, Result};
pub use http::HttpFileService;
pub use logging::init_logging;
pub use poll::{
    DEFAULT_POLL_INTERVAL, PollConfig, PollOptions, resolve_download_url,
    resolve_download_url_with,
};
pub use progress::{ProgressReading, ProgressSink};
pub use response::ServiceResponse;
pub use service::{
    CompressJobStatus, CompressionJob, FileRecord, FileService, InMemoryFileService,
    UploadPayload, UploadTask,
};
