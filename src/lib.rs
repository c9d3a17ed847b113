//! # Zenith Core
//!
//! Client-side routing and reactive state for Zenith pages.
//!
//! Two independent subsystems:
//!
//! - **Routing**: [`pattern`] compiles path patterns (`/users/:id`) into
//!   matchers; [`route`] keeps an ordered table of them and resolves URLs to
//!   route metadata.
//! - **State**: [`store`] provides a dotted-path key/value tree with optional
//!   change notification and two-way element binding.
//!
//! Nothing here is global. A [`Context`] bundles a router and a collaborator
//! [`Registry`]; construct as many as needed.

pub mod context;
pub mod element;
pub mod pattern;
pub mod registry;
pub mod route;
pub mod store;

use std::time::Duration;

use thiserror::Error;

pub use context::Context;
pub use element::{ChangeEvent, ChangeListener, Element, ElementRef, ListenerId, WriteOptions};
pub use pattern::{
    compile, compile_builder, parse, tokenize, Matcher, ParamValue, Params, PathBuilder, PathMatch,
    PathPattern, PatternCompiler, PatternOptions,
};
pub use registry::{Registry, DEFAULT_WAIT_TIMEOUT};
pub use route::{
    Navigation, ResolvedRoute, RouteEntry, RouteSpec, RouteTable, Router, RoutesConfig,
    SettingsLoader,
};
pub use store::{
    ArrayStore, BindableConfig, BindableStore, BindingMode, Changes, Dispatch, MultiStore,
    ObservableConfig, ObservableStore, ReadStore, SetOptions, Store, WriteStore,
};

use pattern::TokenKind;

// ---------------------------------------------------------------------------
// PatternError
// ---------------------------------------------------------------------------

/// Errors raised while compiling a pattern or building a path from one.
/// Indices are character offsets into the pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Missing parameter name at {index}")]
    MissingName { index: usize },

    #[error("Pattern cannot start with \"?\" at {index}")]
    PatternStartsWithQuestion { index: usize },

    #[error("Capturing groups are not allowed at {index}")]
    CapturingGroup { index: usize },

    #[error("Unbalanced pattern at {index}")]
    UnbalancedPattern { index: usize },

    #[error("Missing pattern at {index}")]
    MissingPattern { index: usize },

    #[error("Dangling escape at {index}")]
    DanglingEscape { index: usize },

    #[error("Unexpected {found} at {index}, expected {expected}")]
    UnexpectedToken {
        found: TokenKind,
        index: usize,
        expected: TokenKind,
    },

    #[error("Invalid generated expression: {0}")]
    Regex(#[from] fancy_regex::Error),

    #[error("Expected \"{name}\" to be {expected}")]
    MissingParam { name: String, expected: &'static str },

    #[error("Expected \"{name}\" to match \"{pattern}\", got \"{value}\"")]
    InvalidParam {
        name: String,
        pattern: String,
        value: String,
    },

    #[error("Expected \"{name}\" to not be empty")]
    EmptyRepeat { name: String },

    #[error("Expected \"{name}\" to not repeat")]
    UnexpectedRepeat { name: String },
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unsupported operation: {operation} on {store}")]
    UnsupportedOperation {
        operation: &'static str,
        store: &'static str,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// A handler failed during synchronous dispatch; later handlers did not run.
    #[error("Observer \"{id}\" failed")]
    Observer {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Asynchronous dispatch requires a tokio runtime")]
    NoRuntime,
}

// ---------------------------------------------------------------------------
// RouteError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("No route entry at index {0}")]
    UnknownEntry(usize),

    #[error("Failed to load `{reference}`")]
    Settings {
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid routes config: {0}")]
    Config(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Timed out after {waited:?} waiting for `{name}`")]
    Timeout { name: String, waited: Duration },
}
