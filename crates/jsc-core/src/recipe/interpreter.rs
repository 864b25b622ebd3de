//! Runs a parsed recipe against the remote `rc_*` methods.

use tracing::info;

use crate::api::RecipeCallParams;
use crate::rpc::{Client, ClientError};

use super::grammar::{self, Command, GrammarError};
use super::state::RecipeState;

/// Errors from running a recipe.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("recipe contains an invalid statement at {0}")]
    Grammar(#[from] GrammarError),

    #[error("recipe command on line {line} ({command}) failed with error: {message}")]
    Runtime {
        line: usize,
        command: Command,
        message: String,
    },

    #[error("recipe command on line {line} failed: {source}")]
    Client {
        line: usize,
        #[source]
        source: ClientError,
    },
}

impl RecipeError {
    /// 1-based line of the failing statement.
    pub fn line(&self) -> usize {
        match self {
            RecipeError::Grammar(e) => e.line,
            RecipeError::Runtime { line, .. } | RecipeError::Client { line, .. } => *line,
        }
    }
}

/// Execute every statement of `text` in order, threading the state through.
///
/// The whole document is parsed before the first call is made. Execution
/// stops at the first failing statement; nothing is rolled back.
pub async fn run(
    client: &mut Client,
    text: &str,
    is_dev: bool,
) -> Result<RecipeState, RecipeError> {
    let statements = grammar::parse(text)?;
    let mut state = RecipeState::new(is_dev);

    for stmt in statements {
        let (line, command) = (stmt.line, stmt.command);
        info!(line, %command, "recipe statement");
        let params = RecipeCallParams {
            args: stmt.args,
            options: stmt.options,
            state,
        };
        state = client
            .call_typed(&command.method(), &params)
            .await
            .map_err(|e| match e {
                ClientError::Call(err) => RecipeError::Runtime {
                    line,
                    command,
                    message: err.message,
                },
                source => RecipeError::Client { line, source },
            })?;
    }
    Ok(state)
}
