use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("cipher init error: {0}")]
    CipherInit(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("integrity mismatch for {name}: header digest {expected}, computed {actual}")]
    IntegrityMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{field} is {len} bytes, larger than the {max} byte limit")]
    SizeLimitExceeded {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

impl Error {
    /// Wrap an I/O failure with the object and phase it happened in.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

/// Failures of the asymmetric key-wrapping step.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The PEM container could not be parsed as an RSA key.
    #[error("malformed key material: {0}")]
    Format(String),

    #[error("wrapping file key failed: {0}")]
    Wrap(String),

    /// Wrong private key, corrupted ciphertext, or a recovered key of the wrong size.
    #[error("unwrapping file key failed: {0}")]
    Unwrap(String),

    #[error("random source failed: {0}")]
    Random(String),
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io { context, source } => {
                std::io::Error::new(source.kind(), format!("{context}: {source}"))
            }
            other => std::io::Error::other(other),
        }
    }
}
