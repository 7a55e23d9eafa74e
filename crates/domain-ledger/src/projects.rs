//! `ledger projects`: every project with at least one active record.

use anyhow::Result;

use crate::app;
use crate::config::Config;

pub async fn run_projects(config: &Config, json: bool) -> Result<()> {
    let ledger = app::open(config).await?;
    let names = ledger.project_names().await;
    app::close(ledger).await;
    let names = names?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    if names.is_empty() {
        println!("No projects.");
    }
    for name in &names {
        println!("{}", name);
    }
    Ok(())
}
