//! Command handlers. One module per subcommand.

pub mod check;
pub mod completions;
pub mod doc;
pub mod env;
