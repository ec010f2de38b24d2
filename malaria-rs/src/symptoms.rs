use serde_json::{Map, Value, json};

use crate::config_builder::CampaignSink;

/// Diagnostic sensitivities the simulator stopped reading when
/// `MalariaDiagnostic` gained its own thresholds. Still accepted as input.
const LEGACY_DIAGNOSTIC_KEYS: &[&str] = &[
    "Fever_Detection_Threshold",
    "PCR_Sensitivity",
    "RDT_Sensitivity",
    "New_Diagnostic_Sensitivity",
];

pub fn params() -> Map<String, Value> {
    let block = json!({
        "Anemia_Mortality_Inverse_Width": 150,
        "Anemia_Mortality_Threshold": 1,
        "Anemia_Severe_Inverse_Width": 100,
        "Anemia_Severe_Threshold": 5,

        "Fever_Mortality_Inverse_Width": 1000,
        "Fever_Mortality_Threshold": 10,
        "Fever_Severe_Inverse_Width": 30.323,
        "Fever_Severe_Threshold": 3.8719,

        "Parasite_Mortality_Inverse_Width": 100,
        "Parasite_Mortality_Threshold": 3e6,
        "Parasite_Severe_Inverse_Width": 7.931,
        "Parasite_Severe_Threshold": 3.17351e5,

        "Clinical_Fever_Threshold_High": 1.5,
        "Clinical_Fever_Threshold_Low": 0.5,
        "Min_Days_Between_Clinical_Incidents": 14,

        "PfHRP2_Boost_Rate": 0.07,
        "PfHRP2_Decay_Rate": 0.172,

        "Report_Detection_Threshold_Blood_Smear_Gametocytes": 0.0,
        "Report_Detection_Threshold_Blood_Smear_Parasites": 0.0,
        "Report_Detection_Threshold_Fever": 1.0,
        "Report_Detection_Threshold_PCR_Gametocytes": 0.05,
        "Report_Detection_Threshold_PCR_Parasites": 0.05,
        "Report_Detection_Threshold_PfHRP2": 5.0,
        "Report_Detection_Threshold_True_Parasite_Density": 0.0,

        // 10/uL
        "Gametocyte_Smear_Sensitivity": 0.1,
        "Parasite_Smear_Sensitivity": 0.1,

        "Fever_Detection_Threshold": 1,
        // 0.05/uL
        "PCR_Sensitivity": 20,
        // 100/uL
        "RDT_Sensitivity": 0.01,
        // 40/uL
        "New_Diagnostic_Sensitivity": 0.025,
    });
    match block {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// [`params`] without the legacy diagnostic sensitivities.
pub fn current_params() -> Map<String, Value> {
    let mut block = params();
    for key in LEGACY_DIAGNOSTIC_KEYS {
        block.remove(*key);
    }
    block
}

pub fn apply(sink: &mut impl CampaignSink) {
    sink.update_params(params());
}
