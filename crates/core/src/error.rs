pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {message}")]
    Network { message: String },

    #[error("transport error: http {status}")]
    Transport { status: u16 },

    #[error("server rejected request (code {code}): {message}")]
    ServerRejected { code: i32, message: String },

    #[error("invalid response: {message}")]
    Parse { message: String },

    #[error("compression not ready after {attempts} status queries")]
    PollLimitExceeded { attempts: u32 },

    #[error("cancelled")]
    Cancelled,
}
