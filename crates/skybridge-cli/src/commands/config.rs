//! Print the resolved configuration

use crate::error::CliResult;
use skybridge_config::ResolvedConfig;

pub fn execute(snapshot: &ResolvedConfig) -> CliResult<()> {
    print!("{}", snapshot.to_yaml()?);
    Ok(())
}
