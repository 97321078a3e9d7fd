use thiserror::Error;


/// A wrong or missing token at some grammar point.
#[derive(Error, Debug, PartialEq, Clone)]
#[error("{0}")]
pub struct ParseError(pub &'static str);

#[derive(Error, Debug, PartialEq, Clone)]
pub enum LowerError {
    #[error("Unknown variable name: {0}")]
    UnknownVariable(String),
    #[error("Unknown function referenced: {0}")]
    UnknownFunction(String),
    #[error("Incorrect # arguments passed to {name}: expected {expected}, got {got}")]
    ArgumentCount { name: String, expected: usize, got: usize },
    #[error("invalid binary operator: {0}")]
    InvalidOperator(char),
    #[error("Function cannot be redefined: {0}")]
    Redefinition(String),
    #[error(transparent)]
    Verification(#[from] VerifyError),
}

/// The verifier rejected a function as ill-formed.
#[derive(Error, Debug, PartialEq, Clone)]
#[error("Function {function} is ill-formed: {reason}")]
pub struct VerifyError {
    pub function: String,
    pub reason: String,
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum EngineError {
    #[error("Symbols not found: {0}")]
    SymbolNotFound(String),
    #[error("Incorrect # arguments passed to {name}: expected {expected}, got {got}")]
    ArgumentCount { name: String, expected: usize, got: usize },
    #[error("call stack exhausted in {0}")]
    CallStackExhausted(String),
    #[error("block {block} of {function} has no terminator")]
    Unterminated { function: String, block: String },
    #[error("Function cannot be redefined: {0}")]
    Redefinition(String),
    #[error(transparent)]
    Verification(#[from] VerifyError),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
