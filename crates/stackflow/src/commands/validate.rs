use colored::Colorize;
use std::path::Path;

pub fn handle(dir: &Path) -> anyhow::Result<()> {
    println!("{}", "Validating deployment...".blue());

    let synthesizer = super::load(dir)?;
    if let Some(source) = synthesizer.source() {
        println!("Deployment: {}", source.display().to_string().cyan());
    }

    let synthesis = match synthesizer.synthesize() {
        Ok(synthesis) => synthesis,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Synthesis failed".red().bold());
            eprintln!("  {}", e);
            return Err(e.into());
        }
    };

    let d = synthesizer.deployment();
    let env = synthesizer.env();
    println!("{}", "✓ Deployment is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  Project: {}", d.project.cyan());
    println!("  Domain: {}", env.domain_name);
    for target in [&d.certificate.target, &d.frontend.target, &d.backend.target] {
        println!("    - {} ({})", target.stack.cyan(), target.region);
    }
    println!("  {}", synthesis.plan.summary());

    Ok(())
}
