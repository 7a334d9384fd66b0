use core::fmt;
use std::sync::Arc;

use crate::runtime::iterator::Metadata;

/// Coarse classification of runtime failures.
///
/// Drivers usually only care about the class: flow errors are contract
/// violations in the iterator tree, the remaining classes are query errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `next()` on an exhausted/closed iterator, or protocol calls out of order.
    Flow,
    /// An operand required to hold at most one item held more.
    Cardinality,
    /// No dispatch rule matched the dynamic types of the operands.
    Type,
    /// A lexical value could not be converted to the requested type.
    Cast,
    /// Any other dynamic failure (division by zero, overflow, ...).
    Dynamic,
    /// Failures detected while assembling the iterator tree.
    Static,
}

/// Error codes emitted by the runtime. W3C/JSONiq codes where one exists,
/// `FLOW0001` for iterator protocol violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FLOW0001, // iterator flow (next after exhaustion / close, next before open)
    FORG0003, // zero-or-one violated
    FORG0004, // one-or-more violated
    FORG0005, // exactly-one violated
    XPTY0004, // unexpected dynamic type
    FORG0001, // invalid lexical form / cast failure
    FORG0006, // invalid argument for effective boolean value
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    FODT0001, // overflow in date/time arithmetic
    XPDY0002, // context item absent
    XPST0008, // unbound variable
    XPST0017, // unknown function / wrong arity
    JNDY0003, // duplicate key in object constructor
    FOER0000, // generic error
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            FLOW0001 => "err:FLOW0001",
            FORG0003 => "err:FORG0003",
            FORG0004 => "err:FORG0004",
            FORG0005 => "err:FORG0005",
            XPTY0004 => "err:XPTY0004",
            FORG0001 => "err:FORG0001",
            FORG0006 => "err:FORG0006",
            FOAR0001 => "err:FOAR0001",
            FOAR0002 => "err:FOAR0002",
            FODT0001 => "err:FODT0001",
            XPDY0002 => "err:XPDY0002",
            XPST0008 => "err:XPST0008",
            XPST0017 => "err:XPST0017",
            JNDY0003 => "err:JNDY0003",
            FOER0000 => "err:FOER0000",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            FLOW0001 => ErrorKind::Flow,
            FORG0003 | FORG0004 | FORG0005 => ErrorKind::Cardinality,
            XPTY0004 | FORG0006 => ErrorKind::Type,
            FORG0001 => ErrorKind::Cast,
            XPST0008 | XPST0017 => ErrorKind::Static,
            FOAR0001 | FOAR0002 | FODT0001 | XPDY0002 | JNDY0003 | FOER0000 => ErrorKind::Dynamic,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub metadata: Option<Metadata>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), metadata: None, source: None }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Iterator protocol violation.
    pub fn flow(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::FLOW0001, msg)
    }

    pub fn cardinality(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::FORG0003, msg)
    }

    pub fn unexpected_type(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPTY0004, msg)
    }

    /// Type error for a binary operator whose operand types have no dispatch rule.
    pub fn binary_operation(op: &str, left: &str, right: &str) -> Self {
        Self::unexpected_type(format!(
            "\"{op}\": operation not possible with parameters of type \"{left}\" and \"{right}\""
        ))
    }

    /// Lexical cast failure carrying the literal and both type names.
    pub fn cast(value: &str, source_type: &str, target_type: &str) -> Self {
        Self::from_code(
            ErrorCode::FORG0001,
            format!("\"{value}\": value of type {source_type} is not castable to type {target_type}"),
        )
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        if self.metadata.is_none() {
            self.metadata = Some(metadata);
        }
        self
    }

    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn is_flow(&self) -> bool {
        self.kind() == ErrorKind::Flow
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(m) = &self.metadata {
            write!(f, " (at {m})")?;
        }
        Ok(())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::from_code(ErrorCode::FOER0000, format!("codec error: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}
