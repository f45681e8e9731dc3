use std::path::Path;

pub fn handle(dir: &Path) -> anyhow::Result<()> {
    let synthesis = super::load(dir)?.synthesize()?;
    let script = synthesis
        .user_data()
        .ok_or_else(|| anyhow::anyhow!("No stack in the plan carries a bootstrap script"))?;
    print!("{}", script);
    Ok(())
}
