use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("BLAS call {call} failed with status {status}")]
    Blas { call: &'static str, status: i32 },
    #[error("failed to bind device {ordinal}: {call} returned {status}")]
    DeviceBind {
        ordinal: i32,
        call: &'static str,
        status: i32,
    },
    #[error("failed to load {0}")]
    LibraryLoad(String),
    #[error("{what} = {value} does not fit the BLAS index type")]
    DimensionOverflow { what: &'static str, value: usize },
    #[error("{0}")]
    Other(String),
}

/// A shape-contract violation, described with the offending shapes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ShapeError(pub String);

pub type Result<T> = std::result::Result<T, KernelError>;
