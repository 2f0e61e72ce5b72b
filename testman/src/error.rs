// File: testman/src/error.rs
//
// Structural errors raised while discovering suites and constructing fixtures.
// Test outcomes (assertions, explicit fail/skip) never travel through these
// types; they are passed to the host untouched.

use thiserror::Error;

/// Failure while building a fixture graph
#[derive(Error, Debug)]
pub enum ConstructError {
    /// The member path nested deeper than the configured limit
    #[error("fixture construction exceeded depth {limit} at '{path}' (self-referential fixture?)")]
    DepthExceeded { path: String, limit: usize },

    /// A custom constructor (`New::new`) returned an error
    #[error("custom constructor for {type_name} at '{path}' failed: {source:#}")]
    Custom {
        path: String,
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Mistakes in a suite's test registration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DiscoveryError {
    /// A registered test name lacks the test prefix
    #[error("wrong name for {suite}::{name}, test methods must be named '{prefix}*' and have signature fn(&mut {suite}, &{context})")]
    MissingPrefix {
        suite: &'static str,
        context: &'static str,
        name: String,
        prefix: &'static str,
    },

    /// The same name was registered twice
    #[error("test {suite}::{name} is registered more than once")]
    Duplicate { suite: &'static str, name: String },

    /// A lifecycle method was registered as a test
    #[error("{suite}::{name} is a lifecycle hook, implement it as fn {suite}::{hook}(&mut self, t: &{context}) instead of registering it as a test")]
    HookAsTest {
        suite: &'static str,
        context: &'static str,
        name: String,
        hook: &'static str,
    },
}

/// Harness configuration could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable holds an unusable value
    #[error("invalid value '{value}' for {key}")]
    InvalidEnv { key: &'static str, value: String },

    /// The config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for `HarnessConfig`
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
