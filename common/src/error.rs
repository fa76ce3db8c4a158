/// Failure of a whole vpipe run, mapped to the process exit status.
///
/// Use `{:#}` when logging so the anyhow context chain is shown.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unusable command line: bad rate string, too many files, unknown flag
    #[error("Parameter Error: {0}")]
    Parameter(String),
    /// Input could not be opened or inspected before the transfer started
    #[error("{0:#}")]
    Setup(anyhow::Error),
    /// No file given and standard input is an interactive terminal
    #[error("Can't open file or stdin")]
    AmbiguousInput,
    /// I/O failure after the transfer started
    #[error("{0}")]
    Transfer(#[from] crate::pipe::Error),
    /// Transfer stopped by a cancellation request
    #[error("transfer interrupted")]
    Interrupted(crate::pipe::Summary),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parameter(_) | Error::Setup(_) | Error::Transfer(_) => 9,
            Error::AmbiguousInput => 1,
            Error::Interrupted(_) => 130,
        }
    }
}
