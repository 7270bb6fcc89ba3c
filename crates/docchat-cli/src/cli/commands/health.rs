use anyhow::Result;

use crate::cli::App;

pub async fn check(app: &App) -> Result<()> {
    let url = app.client.base_url();
    if app.client.health_check().await {
        println!("✓ API at {url} is reachable");
        Ok(())
    } else {
        anyhow::bail!("API at {url} is unreachable")
    }
}
