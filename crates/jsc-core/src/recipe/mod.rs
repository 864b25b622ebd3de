//! Recipe DSL: grammar, deployment state and the client-side interpreter.

pub mod grammar;
pub mod interpreter;
pub mod state;

pub use grammar::{Command, GrammarError, OptionValue, Statement, parse};
pub use interpreter::{RecipeError, run};
pub use state::{GdEntry, PackageEntry, RecipeState, SoftwareList};

/// File name of the recipe script inside a recipe source tree.
pub const RECIPE_FILE_NAME: &str = "Jumpstart-Recipe";
