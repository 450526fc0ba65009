//! Error types shared across the rule engine.

use thiserror::Error;

/// Errors raised while parsing or running an embedded expression.
#[derive(Error, Debug, Clone)]
pub enum ExprError {
    /// The source string could not be parsed.
    #[error("failed to parse expression {src:?}: {reason}")]
    Parse {
        /// Offending source string.
        src: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A variable was referenced that has no entry in the environment and the
    /// program was compiled without `allow_undefined`.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// A call referenced a function the environment does not expose.
    #[error("undefined function: {0}")]
    UndefinedFunction(String),

    /// A payload helper function received the wrong argument count.
    #[error("function {name} expects {expected} argument(s), got {got}")]
    Arity {
        /// Function name.
        name: String,
        /// Expected argument count.
        expected: usize,
        /// Argument count actually supplied.
        got: usize,
    },

    /// A payload helper date/time parse failed; this is fatal to the evaluation
    /// that triggered it, per the date-helper contract.
    #[error("cannot parse {kind} {value:?}: {reason}")]
    DateParse {
        /// Which helper failed (`date`, `date-time`, ...).
        kind: &'static str,
        /// The offending input string.
        value: String,
        /// Underlying parse diagnostic.
        reason: String,
    },

    /// A value could not be used the way an operator or function required it
    /// (e.g. comparing a string to a map, calling a non-callable).
    #[error("type error: {0}")]
    Type(String),

    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Errors raised while decoding, compiling, or validating a rule document.
#[derive(Error, Debug)]
pub enum RuleError {
    /// The document declared an unrecognized `style`.
    #[error("unsupported rule style: {0:?}")]
    UnsupportedStyle(String),

    /// A required field was missing or empty (`if`, `by`, `default`, ...).
    #[error("{0}")]
    MalformedDocument(String),

    /// YAML parsing of the raw document failed.
    #[error("cannot parse rule document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization of a `Data` value failed.
    #[error("cannot serialize rule data: {0}")]
    Json(#[from] serde_json::Error),

    /// Compiling one of the document's embedded expressions failed.
    #[error("cannot compile expression: {0}")]
    Compile(#[from] ExprError),

    /// Evaluating a compiled ruler against a payload failed.
    #[error("evaluation failed: {0}")]
    Evaluation(ExprError),

    /// An embedded test case (`tests:`) failed during `ValidateRules`.
    #[error("test case #{index} failed: {reason}")]
    TestFailed {
        /// 0-based index of the failing test case.
        index: usize,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The document's `def` JSON-Schema rejected one or more reachable `then` blocks.
    #[error("schema validation failed: {0}")]
    SchemaInvalid(String),

    /// The document's `def` block was not a valid JSON-Schema.
    #[error("invalid schema definition: {0}")]
    SchemaInvalidDefinition(String),
}

/// Errors surfaced by the repository and the engine facade.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No rule is cached under the requested name.
    #[error("no suitable rule found for {0:?}")]
    NotFound(String),

    /// Expression evaluation failed while calculating a payload.
    #[error("evaluation error: {0}")]
    Evaluation(#[from] ExprError),

    /// The accessor could not be built from the calculated `Data`.
    #[error("cannot decode rule result: {0}")]
    Decode(String),

    /// The driver's watch stream terminated with a fatal error.
    #[error("watch stream failed: {0}")]
    StreamFatal(String),

    /// The watch task's context/token was cancelled.
    #[error("watch cancelled")]
    Cancelled,

    /// A rule document failed admission.
    #[error(transparent)]
    Rule(#[from] RuleError),
}
