//! Error type

use std::io;
use thiserror::Error;

/// Errors raised while parsing or serializing slice data.
///
/// Every variant that originates from the bitstream names the syntax element
/// being processed. The slice data driver additionally wraps fatal errors in
/// `Error::Macroblock` so that callers learn which address was affected.
#[derive(Error, Debug)]
pub enum Error {
    /// A padding bit did not carry its mandated value.
    ///
    /// This is the only recoverable error kind; parsers configured with
    /// `ParserOption::LENIENT_ALIGNMENT` log it instead of raising it.
    #[error("alignment bit `{element}` does not carry its mandated value")]
    AlignmentError { element: &'static str },

    /// A decoded value lies outside the domain of the syntax element.
    #[error("`{element}` has out of range value {value}")]
    InvalidSyntaxElement { element: &'static str, value: i64 },

    /// Run, zero or address accounting exceeded the available budget.
    #[error("`{element}` exceeds the budget of its enclosing structure")]
    StreamCorrupt { element: &'static str },

    /// The bitstream ended before a required read.
    #[error("bitstream ended while reading `{element}`")]
    UnexpectedEndOfStream { element: &'static str },

    /// A fatal error raised while processing one macroblock.
    #[error("macroblock {address}: {source}")]
    Macroblock {
        address: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("unhandled I/O error: {0}")]
    UnhandledIoError(io::Error),

    /// The parser was used inconsistently (e.g. a CAVLC-only element was
    /// requested on a CABAC slice) or an internal table is malformed.
    #[error("internal decoder error")]
    InternalDecoderError,
}

impl Error {
    /// Attach the name of the element being read to an end-of-stream error.
    ///
    /// Other error kinds already carry their element and are returned as-is.
    pub fn within(self, element: &'static str) -> Self {
        match self {
            Self::UnexpectedEndOfStream { .. } => Self::UnexpectedEndOfStream { element },
            other => other,
        }
    }

    /// Wrap this error with the address of the macroblock it occurred in.
    pub fn at_macroblock(self, address: u32) -> Self {
        match self {
            Self::Macroblock { .. } => self,
            other => Self::Macroblock {
                address,
                source: Box::new(other),
            },
        }
    }

    /// Whether decoding of the current slice must be abandoned.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AlignmentError { .. } => false,
            Self::Macroblock { source, .. } => source.is_fatal(),
            _ => true,
        }
    }

    /// The macroblock address the error was raised at, if known.
    pub fn address(&self) -> Option<u32> {
        match self {
            Self::Macroblock { address, .. } => Some(*address),
            _ => None,
        }
    }

    /// The syntax element the error was raised at, if known.
    pub fn element(&self) -> Option<&'static str> {
        match self {
            Self::AlignmentError { element }
            | Self::InvalidSyntaxElement { element, .. }
            | Self::StreamCorrupt { element }
            | Self::UnexpectedEndOfStream { element } => Some(element),
            Self::Macroblock { source, .. } => source.element(),
            _ => None,
        }
    }

    /// The innermost error, with any macroblock context stripped.
    pub fn root(&self) -> &Self {
        match self {
            Self::Macroblock { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEndOfStream { element: "rbsp" }
        } else {
            Self::UnhandledIoError(error)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
