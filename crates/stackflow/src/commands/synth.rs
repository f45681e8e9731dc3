use colored::Colorize;
use stackflow_cloud::PlanStore;
use std::path::Path;
use tracing::info;

pub async fn handle(dir: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let synthesizer = super::load(dir)?;
    if let Some(source) = synthesizer.source() {
        println!("Deployment: {}", source.display().to_string().cyan());
    }

    let synthesis = synthesizer.synthesize()?;

    let store = match out {
        Some(out) => PlanStore::in_dir(out),
        None => PlanStore::new(synthesizer.project_root()),
    };

    let lock = store.acquire_lock().await?;
    let saved = store.save(&synthesis.plan).await;
    lock.release().await?;
    let path = saved?;
    info!(path = %path.display(), "Plan written");

    println!();
    for stack in &synthesis.plan.stacks {
        println!(
            "  {} ({}): {} resources, {} grants",
            stack.stack.cyan(),
            stack.region,
            stack.resources.len(),
            stack.grants.len()
        );
        for import in &stack.imports {
            println!(
                "    ← {} from {} ({})",
                import.export, import.producer_stack, import.producer_region
            );
        }
    }
    println!();
    println!("{}", "✓ Plan synthesized".green().bold());
    println!("  {}", synthesis.plan.summary());
    println!("  {}", path.display().to_string().cyan());
    println!(
        "  {} secret fields handed to {}",
        synthesis.secrets.len(),
        synthesis.secrets.store
    );

    Ok(())
}
