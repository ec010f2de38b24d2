use dtk_malaria::{DiagnosticSurvey, DrugCampaign, ReactiveIrs};
use serde::Deserialize;

/// Everything one run should add to the campaign, in emission order:
/// drug campaigns, then surveys, then reactive IRS.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CampaignPlan {
    pub campaign_name: Option<String>,
    pub drug_campaigns: Vec<DrugCampaign>,
    pub surveys: Vec<DiagnosticSurvey>,
    pub reactive_irs: Vec<ReactiveIrs>,
    /// Adds the clinical symptom and detection thresholds to the config.
    pub symptoms: bool,
    /// Writes this site's reference data and applies its setup.
    pub study_site: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_defaults() {
        let plan: CampaignPlan = serde_json::from_value(json!({
            "drug_campaigns": [{"campaign_type": "MDA", "drug_code": "AL", "start_days": [0]}]
        }))
        .unwrap();
        assert_eq!(plan.drug_campaigns.len(), 1);
        assert_eq!(plan.drug_campaigns[0].repetitions, 3);
        assert!(plan.surveys.is_empty());
        assert!(!plan.symptoms);
        assert!(plan.study_site.is_none());
    }
}
