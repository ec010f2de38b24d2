use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::campaign::{AntimalarialDrug, Intervention};
use crate::config_builder::CampaignSink;
use crate::error::{Error, Result};

/// Resolves a drug code such as `"AL"` into the interventions that
/// distribute it.
pub trait DrugLookup {
    fn drug_configs(&self, sink: &mut dyn CampaignSink, code: &str) -> Result<Vec<Intervention>>;
}

struct Pk {
    cmax: f64,
    decay_t1: f64,
    decay_t2: f64,
    vd: f64,
    c50: f64,
    doses: u32,
    dose_interval: f64,
    irbc_kill: f64,
    gametocyte02_kill: f64,
    gametocyte34_kill: f64,
    gametocyte_m_kill: f64,
    hepatocyte_kill: f64,
}

#[rustfmt::skip]
const BUILTIN_DRUGS: &[(&str, Pk)] = &[
    ("Artemether", Pk { cmax: 114.0, decay_t1: 0.12, decay_t2: 0.12, vd: 1.0, c50: 0.6, doses: 6, dose_interval: 0.5, irbc_kill: 4.8, gametocyte02_kill: 2.5, gametocyte34_kill: 1.5, gametocyte_m_kill: 0.7, hepatocyte_kill: 0.0 }),
    ("Lumefantrine", Pk { cmax: 1017.0, decay_t1: 1.3, decay_t2: 2.0, vd: 10.0, c50: 280.0, doses: 6, dose_interval: 0.5, irbc_kill: 4.8, gametocyte02_kill: 2.4, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
    ("Artesunate", Pk { cmax: 3300.0, decay_t1: 0.1, decay_t2: 0.1, vd: 1.0, c50: 0.6, doses: 3, dose_interval: 1.0, irbc_kill: 4.8, gametocyte02_kill: 2.5, gametocyte34_kill: 1.5, gametocyte_m_kill: 0.7, hepatocyte_kill: 0.0 }),
    ("Amodiaquine", Pk { cmax: 270.0, decay_t1: 0.7, decay_t2: 15.9, vd: 21.6, c50: 55.0, doses: 3, dose_interval: 1.0, irbc_kill: 4.6, gametocyte02_kill: 0.0, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
    ("Chloroquine", Pk { cmax: 150.0, decay_t1: 8.9, decay_t2: 244.0, vd: 3.9, c50: 150.0, doses: 3, dose_interval: 1.0, irbc_kill: 4.8, gametocyte02_kill: 0.0, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
    ("DHA", Pk { cmax: 200.0, decay_t1: 0.2, decay_t2: 0.2, vd: 1.0, c50: 0.6, doses: 3, dose_interval: 1.0, irbc_kill: 9.2, gametocyte02_kill: 2.5, gametocyte34_kill: 1.5, gametocyte_m_kill: 0.7, hepatocyte_kill: 0.0 }),
    ("Piperaquine", Pk { cmax: 30.0, decay_t1: 0.17, decay_t2: 41.0, vd: 49.0, c50: 5.0, doses: 3, dose_interval: 1.0, irbc_kill: 4.6, gametocyte02_kill: 2.3, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
    ("Primaquine", Pk { cmax: 75.0, decay_t1: 0.36, decay_t2: 0.36, vd: 1.0, c50: 15.0, doses: 1, dose_interval: 1.0, irbc_kill: 0.0, gametocyte02_kill: 2.5, gametocyte34_kill: 5.0, gametocyte_m_kill: 50.0, hepatocyte_kill: 0.1 }),
    ("Sulfadoxine", Pk { cmax: 200.0, decay_t1: 8.0, decay_t2: 8.0, vd: 1.0, c50: 100.0, doses: 1, dose_interval: 1.0, irbc_kill: 3.5, gametocyte02_kill: 0.0, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
    ("Pyrimethamine", Pk { cmax: 500.0, decay_t1: 4.0, decay_t2: 4.0, vd: 1.0, c50: 30.0, doses: 1, dose_interval: 1.0, irbc_kill: 3.5, gametocyte02_kill: 0.0, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
    ("Vehicle", Pk { cmax: 10.0, decay_t1: 0.12, decay_t2: 0.12, vd: 1.0, c50: 0.6, doses: 6, dose_interval: 0.5, irbc_kill: 0.0, gametocyte02_kill: 0.0, gametocyte34_kill: 0.0, gametocyte_m_kill: 0.0, hepatocyte_kill: 0.0 }),
];

const BUILTIN_REGIMENS: &[(&str, &[&str])] = &[
    ("AL", &["Artemether", "Lumefantrine"]),
    ("ALP", &["Artemether", "Lumefantrine", "Primaquine"]),
    ("AS", &["Artesunate"]),
    ("ASA", &["Artesunate", "Amodiaquine"]),
    ("CQ", &["Chloroquine"]),
    ("DP", &["DHA", "Piperaquine"]),
    ("DPP", &["DHA", "Piperaquine", "Primaquine"]),
    ("PMQ", &["Primaquine"]),
    ("SP", &["Sulfadoxine", "Pyrimethamine"]),
    ("SPA", &["Sulfadoxine", "Pyrimethamine", "Amodiaquine"]),
    ("Vehicle", &["Vehicle"]),
];

impl Pk {
    fn to_params(&self) -> Map<String, Value> {
        let value = json!({
            "Bodyweight_Exponent": 0,
            "Drug_Cmax": self.cmax,
            "Drug_Decay_T1": self.decay_t1,
            "Drug_Decay_T2": self.decay_t2,
            "Drug_Vd": self.vd,
            "Drug_PKPD_C50": self.c50,
            "Drug_Fulltreatment_Doses": self.doses,
            "Drug_Dose_Interval": self.dose_interval,
            "Max_Drug_IRBC_Kill": self.irbc_kill,
            "Drug_Gametocyte02_Killrate": self.gametocyte02_kill,
            "Drug_Gametocyte34_Killrate": self.gametocyte34_kill,
            "Drug_GametocyteM_Killrate": self.gametocyte_m_kill,
            "Drug_Hepatocyte_Killrate": self.hepatocyte_kill,
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Regimens (code → drug names) and per-drug simulator parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DrugTable {
    #[serde(default)]
    regimens: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    drugs: BTreeMap<String, Map<String, Value>>,
}

impl DrugTable {
    pub fn builtin() -> Self {
        Self {
            regimens: BUILTIN_REGIMENS
                .iter()
                .map(|(code, drugs)| {
                    (
                        code.to_string(),
                        drugs.iter().map(|d| d.to_string()).collect(),
                    )
                })
                .collect(),
            drugs: BUILTIN_DRUGS
                .iter()
                .map(|(name, pk)| (name.to_string(), pk.to_params()))
                .collect(),
        }
    }

    /// Built-in table with regimens and drug parameters from `source`
    /// layered on top. Drug parameter blocks merge key by key.
    ///
    /// ```toml
    /// [regimens]
    /// AQ = ["Amodiaquine"]
    ///
    /// [drugs.Amodiaquine]
    /// Drug_Cmax = 300
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let overrides: DrugTable = toml::from_str(source)?;
        let mut table = Self::builtin();
        table.regimens.extend(overrides.regimens);
        for (drug, params) in overrides.drugs {
            table.drugs.entry(drug).or_default().extend(params);
        }
        Ok(table)
    }

    pub fn regimen(&self, code: &str) -> Option<&[String]> {
        self.regimens.get(code).map(Vec::as_slice)
    }

    pub fn drug_params(&self) -> Map<String, Value> {
        self.drugs
            .iter()
            .map(|(drug, params)| (drug.clone(), Value::Object(params.clone())))
            .collect()
    }
}

impl DrugLookup for DrugTable {
    /// Also publishes the full `Malaria_Drug_Params` block, so campaigns
    /// using different regimens never overwrite each other's drugs.
    fn drug_configs(&self, sink: &mut dyn CampaignSink, code: &str) -> Result<Vec<Intervention>> {
        let drugs = self
            .regimen(code)
            .ok_or_else(|| Error::UnknownDrugCode(code.to_string()))?;

        let mut params = Map::new();
        params.insert(
            "Malaria_Drug_Params".to_string(),
            Value::Object(self.drug_params()),
        );
        sink.update_params(params);

        Ok(drugs
            .iter()
            .map(|drug| {
                Intervention::AntimalarialDrug(AntimalarialDrug {
                    drug_type: drug.clone(),
                    cost: 1.0,
                    dosing: None,
                })
            })
            .collect())
    }
}
