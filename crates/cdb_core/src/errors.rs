use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdbError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// The file disagrees with its own layout: short header, tables or
    /// records past the end of file, or slots that cannot belong to their bucket.
    #[error("Corrupt database: {0}")]
    Corrupt(&'static str),

    #[error("Database would exceed the 32-bit offset space")]
    TooLarge,
}

pub type Result<T> = std::result::Result<T, CdbError>;
