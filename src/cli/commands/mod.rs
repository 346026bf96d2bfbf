//! CLI command dispatch and handlers.
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod scenarios;
pub mod serve;
pub mod version;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, ScenariosSubcommand};
use crate::error::RedArenaError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), RedArenaError> {
    match cli.command {
        Commands::Serve(args) => serve::run(&args, cancel).await,
        Commands::Scenarios(cmd) => match cmd.subcommand {
            ScenariosSubcommand::List(args) => scenarios::list(&args),
            ScenariosSubcommand::Validate(args) => scenarios::validate(&args),
        },
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
