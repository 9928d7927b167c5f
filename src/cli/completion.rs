//! Shell completion generation for docarrow

use std::io::Write;

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::CliArgs;

/// Write the completion script for `shell` to `out`
pub fn generate_completion(shell: Shell, out: &mut dyn Write) {
    let mut cmd = CliArgs::command();
    generate(shell, &mut cmd, "docarrow", out);
}
