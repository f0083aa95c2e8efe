use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhereaboutsError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Unknown device: {device}")]
    UnknownDevice { device: String },
    #[error("Invalid reading: {value:?} is not a signal strength")]
    InvalidReading { value: String },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Delivery error: {0}")]
    Delivery(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WhereaboutsError {
    /// Client errors never touch the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnknownDevice { .. } | Self::InvalidReading { .. })
    }
}

pub type Result<T> = std::result::Result<T, WhereaboutsError>;

// Helper conversions
impl From<rusqlite::Error> for WhereaboutsError {
    fn from(e: rusqlite::Error) -> Self { Self::Storage(e.to_string()) }
}
impl From<config::ConfigError> for WhereaboutsError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<reqwest::Error> for WhereaboutsError {
    fn from(e: reqwest::Error) -> Self { Self::Delivery(e.to_string()) }
}
impl From<tokio::task::JoinError> for WhereaboutsError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Storage(format!("storage task failed: {e}"))
    }
}
