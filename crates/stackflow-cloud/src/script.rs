//! User-data rendering
//!
//! Renders a [`BootstrapSequence`] into the shell script handed to the
//! instance at first boot. The script fails fast and tees everything it does
//! into a log file on the instance.

use crate::bootstrap::{BootstrapSequence, Phase};
use crate::error::{CloudError, Result};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

/// Where the script logs on the instance
pub const LOG_PATH: &str = "/var/log/stackflow-bootstrap.log";

const SCRIPT_TEMPLATE: &str = r#"#!/bin/bash
# Bootstrap for {{ instance }} ({{ region }})
set -euo pipefail

exec > >(tee -a {{ log_path }}) 2>&1
{% for name, value in environment %}
export {{ name }}="{{ value }}"
{%- endfor %}
{% for phase in phases %}
# --- phase {{ phase.index }}: {{ phase.title }} ---
{%- for step in phase.steps %}
echo "[stackflow] step {{ step.order }}: {{ step.description }}"
{{ step.command }}
{%- endfor %}
{% endfor %}
echo "[stackflow] bootstrap complete"
"#;

#[derive(Serialize)]
struct PhaseView<'a> {
    index: u8,
    title: &'static str,
    steps: Vec<StepView<'a>>,
}

#[derive(Serialize)]
struct StepView<'a> {
    order: usize,
    description: String,
    command: &'a str,
}

/// Render `sequence` as a bash user-data script
pub fn render_script(sequence: &BootstrapSequence) -> Result<String> {
    sequence.validate()?;

    let phases: Vec<PhaseView<'_>> = Phase::ALL
        .iter()
        .map(|phase| PhaseView {
            index: phase.index(),
            title: phase.title(),
            steps: sequence
                .steps_in(*phase)
                .map(|step| StepView {
                    order: step.order,
                    description: echo_safe(&step.description),
                    command: &step.command,
                })
                .collect(),
        })
        .filter(|view| !view.steps.is_empty())
        .collect();

    let mut context = Context::new();
    context.insert("instance", sequence.instance.as_str());
    context.insert("region", &sequence.region);
    context.insert("log_path", LOG_PATH);
    context.insert("environment", &sequence.environment);
    context.insert("phases", &phases);

    let script = Tera::default()
        .render_str(SCRIPT_TEMPLATE, &context)
        .map_err(|e| CloudError::Template(tera_error_detail(&e)))?;

    debug!(
        instance = %sequence.instance,
        bytes = script.len(),
        "Rendered bootstrap script"
    );
    Ok(script)
}

/// Descriptions end up inside a double-quoted echo
fn echo_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '"' | '\\' | '`' | '$' => '\'',
            '\n' | '\r' => ' ',
            c => c,
        })
        .collect()
}

fn tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    details.join(" | ")
}
