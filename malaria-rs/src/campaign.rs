use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::trigger::TriggerName;

fn flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

fn opt_flag<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => flag(v, serializer),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class", rename = "CampaignEvent")]
pub struct CampaignEvent {
    #[serde(rename = "Start_Day")]
    pub start_day: u32,
    #[serde(rename = "Event_Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Nodeset_Config")]
    pub nodeset: NodeSelector,
    #[serde(rename = "Event_Coordinator_Config")]
    pub coordinator: EventCoordinator,
}

impl CampaignEvent {
    pub fn new(start_day: u32, nodeset: NodeSelector, coordinator: EventCoordinator) -> Self {
        Self {
            start_day,
            name: None,
            nodeset,
            coordinator,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum NodeSelector {
    #[default]
    #[serde(rename = "NodeSetAll")]
    AllNodes,
    #[serde(rename = "NodeSetNodeList")]
    NodeList {
        #[serde(rename = "Node_List")]
        ids: Vec<u32>,
    },
}

impl NodeSelector {
    /// An empty id list means every node.
    pub fn from_ids(ids: &[u32]) -> Self {
        if ids.is_empty() {
            Self::AllNodes
        } else {
            Self::NodeList { ids: ids.to_vec() }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class", rename = "StandardInterventionDistributionEventCoordinator")]
pub struct EventCoordinator {
    #[serde(rename = "Number_Distributions", skip_serializing_if = "Option::is_none")]
    pub number_distributions: Option<i32>,
    #[serde(rename = "Number_Repetitions", skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,
    #[serde(
        rename = "Timesteps_Between_Repetitions",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<u32>,
    #[serde(rename = "Demographic_Coverage", skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(flatten)]
    pub target: Option<TargetDemographic>,
    #[serde(
        rename = "Node_Property_Restrictions",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub node_restrictions: Vec<PropertyRestriction>,
    #[serde(
        rename = "Property_Restrictions_Within_Node",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ind_restrictions: Vec<PropertyRestriction>,
    #[serde(rename = "Intervention_Config")]
    pub intervention: Intervention,
}

impl EventCoordinator {
    pub fn new(intervention: Intervention) -> Self {
        Self {
            number_distributions: None,
            repetitions: None,
            interval: None,
            coverage: None,
            target: None,
            node_restrictions: Vec::new(),
            ind_restrictions: Vec::new(),
            intervention,
        }
    }
}

/// Who an event coordinator or health-triggered listener may reach.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "TargetSpec")]
pub enum TargetDemographic {
    #[default]
    Everyone,
    AgeRange {
        min: f64,
        max: f64,
    },
    Label(String),
}

impl TargetDemographic {
    /// A mapping qualifies as an age range only when it carries both
    /// `agemin` and `agemax`; anything else falls back to `Everyone`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(label) if label == "Everyone" => Self::Everyone,
            Value::String(label) => Self::Label(label.clone()),
            Value::Object(map) => {
                match (
                    map.get("agemin").and_then(Value::as_f64),
                    map.get("agemax").and_then(Value::as_f64),
                ) {
                    (Some(min), Some(max)) => Self::AgeRange { min, max },
                    _ => {
                        tracing::warn!(target_group = %value, "incomplete age range, targeting everyone");
                        Self::Everyone
                    }
                }
            }
            _ => {
                tracing::warn!(target_group = %value, "unrecognized target group, targeting everyone");
                Self::Everyone
            }
        }
    }

    pub fn is_everyone(&self) -> bool {
        matches!(self, Self::Everyone)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetSpec {
    Label(String),
    Mapping(serde_json::Map<String, Value>),
}

impl From<TargetSpec> for TargetDemographic {
    fn from(spec: TargetSpec) -> Self {
        match spec {
            TargetSpec::Label(label) => Self::from_value(&Value::String(label)),
            TargetSpec::Mapping(map) => Self::from_value(&Value::Object(map)),
        }
    }
}

impl Serialize for TargetDemographic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Everyone => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Target_Demographic", "Everyone")?;
                map.end()
            }
            Self::AgeRange { min, max } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("Target_Demographic", "ExplicitAgeRanges")?;
                map.serialize_entry("Target_Age_Min", min)?;
                map.serialize_entry("Target_Age_Max", max)?;
                map.end()
            }
            Self::Label(label) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Target_Demographic", label)?;
                map.end()
            }
        }
    }
}

/// Property key/value pairs that must all hold (logical AND). A list of
/// restrictions is satisfied when any one element holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyRestriction(BTreeMap<String, String>);

impl PropertyRestriction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns `restrictions` with every entry additionally requiring `gate`.
    /// With no restrictions the gate alone is the only requirement.
    pub fn gated(restrictions: &[PropertyRestriction], gate: &PropertyRestriction) -> Vec<Self> {
        if restrictions.is_empty() {
            return vec![gate.clone()];
        }
        restrictions
            .iter()
            .map(|restriction| {
                let mut merged = restriction.clone();
                merged
                    .0
                    .extend(gate.0.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class")]
pub enum Intervention {
    #[serde(rename = "NodeLevelHealthTriggeredIV")]
    HealthTriggered(HealthTriggered),
    #[serde(rename = "MultiInterventionDistributor")]
    MultiDistributor(MultiDistributor),
    DelayedIntervention(DelayedIntervention),
    #[serde(rename = "MalariaDiagnostic")]
    Diagnostic(Diagnostic),
    BroadcastEvent {
        #[serde(rename = "Broadcast_Event")]
        event: TriggerName,
    },
    PropertyValueChanger(PropertyChanger),
    NodePropertyValueChanger(NodePropertyChanger),
    #[serde(rename = "BroadcastEventToOtherNodes")]
    FocalBroadcast(FocalBroadcast),
    AntimalarialDrug(AntimalarialDrug),
    SpaceSpraying(SpaceSpraying),
}

impl Intervention {
    pub fn multi(interventions: Vec<Intervention>) -> Self {
        Self::MultiDistributor(MultiDistributor {
            interventions,
            ind_restrictions: Vec::new(),
        })
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::HealthTriggered(_) => "NodeLevelHealthTriggeredIV",
            Self::MultiDistributor(_) => "MultiInterventionDistributor",
            Self::DelayedIntervention(_) => "DelayedIntervention",
            Self::Diagnostic(_) => "MalariaDiagnostic",
            Self::BroadcastEvent { .. } => "BroadcastEvent",
            Self::PropertyValueChanger(_) => "PropertyValueChanger",
            Self::NodePropertyValueChanger(_) => "NodePropertyValueChanger",
            Self::FocalBroadcast(_) => "BroadcastEventToOtherNodes",
            Self::AntimalarialDrug(_) => "AntimalarialDrug",
            Self::SpaceSpraying(_) => "SpaceSpraying",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthTriggered {
    #[serde(rename = "Trigger_Condition_List")]
    pub trigger_conditions: Vec<TriggerName>,
    #[serde(rename = "Duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(rename = "Demographic_Coverage", skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    #[serde(flatten)]
    pub target: Option<TargetDemographic>,
    #[serde(
        rename = "Target_Residents_Only",
        serialize_with = "opt_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub residents_only: Option<bool>,
    #[serde(flatten)]
    pub blackout: Option<Blackout>,
    #[serde(
        rename = "Node_Property_Restrictions",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub node_restrictions: Vec<PropertyRestriction>,
    #[serde(
        rename = "Property_Restrictions_Within_Node",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ind_restrictions: Vec<PropertyRestriction>,
    #[serde(rename = "Actual_IndividualIntervention_Config")]
    pub actual: Box<Intervention>,
}

impl HealthTriggered {
    /// A listener with no optional fields set.
    pub fn listening(trigger_conditions: Vec<TriggerName>, actual: Intervention) -> Self {
        Self {
            trigger_conditions,
            duration: None,
            coverage: None,
            target: None,
            residents_only: None,
            blackout: None,
            node_restrictions: Vec::new(),
            ind_restrictions: Vec::new(),
            actual: Box::new(actual),
        }
    }
}

/// Suppresses repeat triggering of the same listener within one pulse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blackout {
    #[serde(rename = "Blackout_Event_Trigger", skip_serializing_if = "Option::is_none")]
    pub event_trigger: Option<TriggerName>,
    #[serde(rename = "Blackout_Period", skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,
    #[serde(rename = "Blackout_On_First_Occurrence", serialize_with = "flag")]
    pub on_first_occurrence: bool,
}

impl Blackout {
    pub fn first_occurrence_only() -> Self {
        Self {
            event_trigger: None,
            period: None,
            on_first_occurrence: true,
        }
    }

    pub fn one_step(event_trigger: &str, on_first_occurrence: bool) -> Self {
        Self {
            event_trigger: Some(TriggerName::from(event_trigger)),
            period: Some(1),
            on_first_occurrence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiDistributor {
    #[serde(rename = "Intervention_List")]
    pub interventions: Vec<Intervention>,
    #[serde(
        rename = "Property_Restrictions_Within_Node",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ind_restrictions: Vec<PropertyRestriction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DelayDistribution {
    #[default]
    #[serde(rename = "FIXED_DURATION")]
    FixedDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayedIntervention {
    #[serde(rename = "Delay_Distribution")]
    pub distribution: DelayDistribution,
    #[serde(rename = "Delay_Period")]
    pub period: u32,
    #[serde(rename = "Actual_IndividualIntervention_Configs")]
    pub configs: Vec<Intervention>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiagnosticType {
    #[serde(rename = "BLOOD_SMEAR_PARASITES")]
    BloodSmearParasites,
    #[serde(rename = "BLOOD_SMEAR_GAMETOCYTES")]
    BloodSmearGametocytes,
    #[serde(rename = "PCR_PARASITES")]
    PcrParasites,
    #[serde(rename = "PCR_GAMETOCYTES")]
    PcrGametocytes,
    #[serde(rename = "PF_HRP2")]
    PfHrp2,
    #[default]
    #[serde(rename = "TRUE_PARASITE_DENSITY")]
    TrueParasiteDensity,
    #[serde(rename = "TRUE_INFECTION_STATUS")]
    TrueInfectionStatus,
    #[serde(rename = "FEVER")]
    Fever,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    #[serde(rename = "MalariaDiagnostic_Type")]
    pub diagnostic_type: DiagnosticType,
    #[serde(rename = "Detection_Threshold")]
    pub threshold: f64,
    #[serde(flatten)]
    pub on_positive: PositiveDiagnosis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Event_Or_Config")]
pub enum PositiveDiagnosis {
    Event {
        #[serde(rename = "Positive_Diagnosis_Event")]
        event: TriggerName,
    },
    Config {
        #[serde(rename = "Positive_Diagnosis_Config")]
        config: Box<Intervention>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyChanger {
    #[serde(rename = "Target_Property_Key")]
    pub key: String,
    #[serde(rename = "Target_Property_Value")]
    pub value: String,
    #[serde(rename = "Daily_Probability")]
    pub daily_probability: f64,
    #[serde(rename = "Maximum_Duration")]
    pub maximum_duration: u32,
    #[serde(rename = "Revert")]
    pub revert: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePropertyChanger {
    #[serde(rename = "Target_NP_Key_Value")]
    pub key_value: String,
    #[serde(rename = "Daily_Probability")]
    pub daily_probability: f64,
    #[serde(rename = "Maximum_Duration")]
    pub maximum_duration: u32,
    #[serde(rename = "Revert")]
    pub revert: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeSelectionType {
    /// Nodes within the focal radius.
    #[default]
    DistanceOnly,
    /// Nodes the individual can migrate to (local and regional links).
    MigrationNodesOnly,
    /// Migratable nodes that also lie within the radius.
    DistanceAndMigration,
}

/// Reach of a focal broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "RadiusSpec")]
pub enum FocalRadius {
    #[default]
    Household,
    Km(f64),
}

impl FocalRadius {
    /// Numeric strings are kilometres; anything else ("hh") stays within
    /// the household.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(km) => Self::Km(km),
            Err(_) => Self::Household,
        }
    }

    pub fn km(&self) -> f64 {
        match self {
            Self::Household => 0.0,
            Self::Km(km) => *km,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RadiusSpec {
    Km(f64),
    Text(String),
}

impl From<RadiusSpec> for FocalRadius {
    fn from(spec: RadiusSpec) -> Self {
        match spec {
            RadiusSpec::Km(km) => Self::Km(km),
            RadiusSpec::Text(raw) => Self::parse(&raw),
        }
    }
}

impl Serialize for FocalRadius {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.km())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocalBroadcast {
    #[serde(rename = "Event_Trigger")]
    pub event_trigger: TriggerName,
    #[serde(rename = "Include_My_Node", serialize_with = "flag")]
    pub include_my_node: bool,
    #[serde(rename = "Node_Selection_Type")]
    pub node_selection: NodeSelectionType,
    #[serde(rename = "Max_Distance_To_Other_Nodes_Km")]
    pub radius: FocalRadius,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntimalarialDrug {
    #[serde(rename = "Drug_Type")]
    pub drug_type: String,
    #[serde(rename = "Cost_To_Consumer")]
    pub cost: f64,
    #[serde(rename = "Dosing_Type", skip_serializing_if = "Option::is_none")]
    pub dosing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "class")]
pub enum WaningEffect {
    #[serde(rename = "WaningEffectBox")]
    Box {
        #[serde(rename = "Initial_Effect")]
        initial_effect: f64,
        #[serde(rename = "Decay_Time_Constant")]
        decay_time_constant: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceSpraying {
    #[serde(rename = "Cost_To_Consumer")]
    pub cost: f64,
    #[serde(rename = "Habitat_Target")]
    pub habitat_target: String,
    #[serde(rename = "Spray_Kill_Target")]
    pub kill_target: String,
    #[serde(rename = "Killing_Config")]
    pub killing: WaningEffect,
    #[serde(rename = "Reduction_Config")]
    pub reduction: WaningEffect,
}
