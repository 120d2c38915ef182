//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// The program (and its arguments) bridged onto the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program path or name looked up on `PATH`
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command spec with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build a command spec from invocation-style arguments, program first
    pub fn from_argv<I, S>(argv: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv
            .next()
            .filter(|p: &String| !p.trim().is_empty())
            .ok_or(ConfigError::MissingCommand)?;

        Ok(Self {
            program,
            args: argv.collect(),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
