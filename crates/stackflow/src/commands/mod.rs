pub mod script;
pub mod synth;
pub mod validate;

use colored::Colorize;
use stackflow_cloud_aws::Synthesizer;
use std::path::Path;

/// Load the description from `dir`, reporting failures the same way for every command
pub(crate) fn load(dir: &Path) -> anyhow::Result<Synthesizer> {
    Synthesizer::from_project(dir).map_err(|e| {
        eprintln!("{}", "✗ Failed to load deployment".red().bold());
        eprintln!("  {}", e);
        e.into()
    })
}
