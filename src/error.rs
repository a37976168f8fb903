//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors (e.g., [`ParseError`],
//! [`ResolveError`]) while command handlers at the CLI boundary convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! BlueprintError
//! ├── Parse(ParseError)      — malformed directives, include cycles
//! ├── Resolve(ResolveError)  — unknown/ambiguous dependencies, cycles, duplicate ids
//! ├── Handler(HandlerError)  — invalid rule parameters, unsafe identifiers
//! └── Status(StatusError)    — reading or writing the status document
//! ```
//!
//! Parse and resolve errors are fatal before any side effect; handler errors
//! are recorded against a single rule and the run continues.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum BlueprintError {
    /// The blueprint could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The parsed rules could not be ordered.
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// A rule could not be turned into an executable handler.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// The persisted status document could not be read or written.
    #[error("Status error: {0}")]
    Status(#[from] StatusError),
}

/// Errors raised while parsing a blueprint file.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The first word of a directive is not a known action.
    #[error("{file}:{line}: unknown action '{action}'")]
    UnknownAction {
        /// File containing the directive.
        file: String,
        /// One-based line number.
        line: usize,
        /// The unrecognised action word.
        action: String,
    },

    /// A directive is missing a required positional argument or option.
    #[error("{file}:{line}: '{action}' requires {what}")]
    MissingArgument {
        /// File containing the directive.
        file: String,
        /// One-based line number.
        line: usize,
        /// Action whose argument is missing.
        action: String,
        /// Human-readable description of the missing piece.
        what: String,
    },

    /// An option is not valid for the directive it appears on.
    #[error("{file}:{line}: option '{option}' is not valid for '{action}'")]
    InvalidOption {
        /// File containing the directive.
        file: String,
        /// One-based line number.
        line: usize,
        /// Action the option was attached to.
        action: String,
        /// The offending option key.
        option: String,
    },

    /// A single-valued directive received an extra positional argument.
    #[error("{file}:{line}: unexpected argument '{argument}' for '{action}'")]
    UnexpectedArgument {
        /// File containing the directive.
        file: String,
        /// One-based line number.
        line: usize,
        /// Action the argument was attached to.
        action: String,
        /// The extra token.
        argument: String,
    },

    /// An `include` chain leads back to a file that is still being parsed.
    #[error("include cycle detected: {}", chain.join(" → "))]
    IncludeCycle {
        /// Files on the include stack, ending with the repeated one.
        chain: Vec<String>,
    },

    /// A blueprint or included file could not be read.
    #[error("cannot read blueprint {}: {source}", path.display())]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while ordering rules by their `after:` declarations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// An `after:` token does not match any rule's dependency key.
    #[error("rule '{rule}' depends on unknown rule '{reference}'")]
    UnknownDependency {
        /// The unresolvable `after:` token.
        reference: String,
        /// Dependency key of the rule that declared it.
        rule: String,
    },

    /// An `after:` token matches more than one rule.
    #[error("dependency '{reference}' is ambiguous: {count} rules share that key")]
    AmbiguousDependency {
        /// The ambiguous `after:` token.
        reference: String,
        /// How many rules share the key.
        count: usize,
    },

    /// The dependency graph contains at least one cycle.
    #[error("dependency cycle detected between: {}", members.join(", "))]
    DependencyCycle {
        /// Dependency keys of every rule that could not be ordered.
        members: Vec<String>,
    },

    /// Two rules declare the same explicit `id:`.
    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),
}

/// Errors raised when a rule's parameters cannot be executed safely.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A parameter value is malformed (e.g. a bad permission string).
    #[error("invalid {param} '{value}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        param: String,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A token destined for a shell command contains disallowed characters.
    #[error("refusing to use unsafe {what} '{value}' in a shell command")]
    UnsafeIdentifier {
        /// What the token represents (package, host, version, …).
        what: String,
        /// Offending value.
        value: String,
    },

    /// A file the rule operates on does not exist.
    #[error("target not found: {0}")]
    MissingTarget(String),

    /// No password could be obtained for a declared password id.
    #[error("no password available for password-id '{0}'")]
    MissingSecret(String),

    /// The rule kind has no package manager on this platform.
    #[error("no supported package manager found on {0}")]
    NoPackageManager(String),
}

/// Errors raised while loading or persisting the status document.
#[derive(Error, Debug)]
pub enum StatusError {
    /// The status document exists but could not be read.
    #[error("cannot read status file {}: {source}", path.display())]
    Io {
        /// Path of the status document.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The status document is not valid JSON of the expected shape.
    #[error("status file {} is malformed: {source}", path.display())]
    Malformed {
        /// Path of the status document.
        path: PathBuf,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// The status document could not be written.
    #[error("cannot write status file {}: {source}", path.display())]
    Write {
        /// Path of the status document.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
