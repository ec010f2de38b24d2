use dtk_malaria::{ConfigBuilder, Environment, Result};
use serde_json::json;

use crate::plan::CampaignPlan;

pub const CAMPAIGN_FILE: &str = "campaign.json";
pub const CONFIG_FILE: &str = "config.json";
pub const REFERENCE_FILE: &str = "reference.csv";

/// Campaign first, then parameter overrides when there are any.
pub fn write_config(ctx: &Environment<CampaignPlan>, cb: &ConfigBuilder) -> Result<()> {
    ctx.write(CAMPAIGN_FILE, cb.to_json_pretty()?.as_bytes())?;
    if !cb.params().is_empty() {
        let config = serde_json::to_string_pretty(&json!({ "parameters": cb.params() }))?;
        ctx.write(CONFIG_FILE, config.as_bytes())?;
    }
    Ok(())
}
