pub mod output;
pub mod plan;

use std::fs;

use dtk_malaria::study_sites::{self, CalibSite};
use dtk_malaria::{
    ConfigBuilder, DrugTable, Environment, Result, add_diagnostic_survey, add_drug_campaign,
    add_reactive_node_irs, symptoms,
};
use tracing_subscriber::EnvFilter;

use plan::CampaignPlan;

fn main() {
    // stdout carries the campaign when no output directory is given
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("campaign=info,dtk_malaria=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        tracing::error!(%err, "campaign build failed");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let ctx = Environment::<CampaignPlan>::load()?;
    let plan = ctx.input.clone().unwrap_or_default();
    tracing::info!(replicate = ctx.replicate, "loaded campaign plan");

    let drugs = match ctx.file("drugs") {
        Some(path) => DrugTable::from_toml_str(&fs::read_to_string(path)?)?,
        None => DrugTable::builtin(),
    };

    let mut cb = match &plan.campaign_name {
        Some(name) => ConfigBuilder::new(name.clone()),
        None => ConfigBuilder::default(),
    };

    for campaign in &plan.drug_campaigns {
        let tags = add_drug_campaign(&mut cb, &drugs, campaign)?;
        tracing::debug!(?tags, "drug campaign tags");
    }
    for survey in &plan.surveys {
        add_diagnostic_survey(&mut cb, survey)?;
    }
    for irs in &plan.reactive_irs {
        add_reactive_node_irs(&mut cb, irs);
    }
    if plan.symptoms {
        symptoms::apply(&mut cb);
    }

    if let Some(name) = &plan.study_site {
        let site = study_sites::by_name(name, ctx.file("parasitology"))?;
        site.setup(&mut cb);
        let reference = site.reference_data()?;
        ctx.write_csv(
            output::REFERENCE_FILE,
            &reference.header_refs(),
            &reference.rows,
        )?;
        tracing::info!(site = site.name(), rows = reference.len(), "wrote reference data");
    }

    output::write_config(&ctx, &cb)?;
    tracing::info!(
        events = cb.events().len(),
        fingerprint = %cb.fingerprint()?,
        "wrote campaign"
    );
    Ok(())
}
