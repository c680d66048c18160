use std::fmt;

/// A basic error type from this library.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A generic error message.
    Msg(String),

    /// A TXT attribute key failed validation.
    ///
    /// Keys must be non-empty printable US-ASCII (0x20-0x7E) and must not
    /// contain the '=' character. See RFC 6763 section 6.4.
    InvalidKey(String),

    /// A service instance name ended in the middle of an escape sequence.
    TerminatingEscape,

    /// A domain name could not be converted into DNS wire form.
    InvalidName(String),

    /// An advertiser does not control the requested domain.
    ///
    /// Returned before any backend state is mutated.
    UnsupportedDomain {
        /// The domain that is not supported.
        domain: String,
        /// An optional provider-specific reason.
        cause: Option<String>,
    },

    /// The operation was canceled via its shutdown or cancellation handle.
    Canceled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Msg(s) => write!(f, "{}", s),
            Error::InvalidKey(s) => write!(f, "invalid attribute key: {}", s),
            Error::TerminatingEscape => {
                write!(f, "name is terminated with an escape character")
            }
            Error::InvalidName(s) => write!(f, "invalid domain name: {}", s),
            Error::UnsupportedDomain { domain, cause } => {
                write!(
                    f,
                    "advertising DNS-SD service instances on the {:?} domain is not supported",
                    domain
                )?;
                if let Some(cause) = cause {
                    write!(f, ": {}", cause)?;
                }
                Ok(())
            }
            Error::Canceled => write!(f, "operation canceled"),
        }
    }
}

impl std::error::Error for Error {}

/// One and only `Result` type from this library crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A simple macro to report all kinds of errors.
macro_rules! e_fmt {
  ($($arg:tt)+) => {
      crate::Error::Msg(format!($($arg)+))
  };
}

pub(crate) use e_fmt;
