use serde::Deserialize;

use crate::campaign::{
    Blackout, CampaignEvent, Diagnostic, DiagnosticType, EventCoordinator, HealthTriggered,
    Intervention, MultiDistributor, NodeSelector, PositiveDiagnosis, PropertyRestriction,
    TargetDemographic,
};
use crate::config_builder::CampaignSink;
use crate::error::Result;
use crate::fragments::{ReactivePlan, ReactiveSchedule, broadcast};
use crate::trigger::TriggerName;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiagnosticSurvey {
    pub coverage: f64,
    pub repetitions: u32,
    pub interval: u32,
    pub target: TargetDemographic,
    pub start_day: u32,
    pub diagnostic_type: DiagnosticType,
    pub threshold: f64,
    pub event_name: String,
    pub node_cfg: NodeSelector,
    /// Given to individuals who test positive, followed by a
    /// `TestedPositive` broadcast.
    #[serde(skip)]
    pub positive_diagnosis_configs: Vec<Intervention>,
    pub received_test_event: TriggerName,
    pub ind_restrictions: Vec<PropertyRestriction>,
    pub node_restrictions: Vec<PropertyRestriction>,
    /// Only gates the positive branch, never the test itself.
    pub positive_ind_restrictions: Vec<PropertyRestriction>,
    pub trigger_conditions: Vec<TriggerName>,
    pub listening_duration: i32,
    pub triggered_delay: u32,
}

impl Default for DiagnosticSurvey {
    fn default() -> Self {
        Self {
            coverage: 1.0,
            repetitions: 1,
            interval: 365,
            target: TargetDemographic::Everyone,
            start_day: 0,
            diagnostic_type: DiagnosticType::BloodSmearParasites,
            threshold: 40.0,
            event_name: "Diagnostic Survey".to_string(),
            node_cfg: NodeSelector::AllNodes,
            positive_diagnosis_configs: Vec::new(),
            received_test_event: TriggerName::from(TriggerName::RECEIVED_TEST),
            ind_restrictions: Vec::new(),
            node_restrictions: Vec::new(),
            positive_ind_restrictions: Vec::new(),
            trigger_conditions: Vec::new(),
            listening_duration: -1,
            triggered_delay: 0,
        }
    }
}

impl DiagnosticSurvey {
    pub fn build(&self) -> Result<Vec<CampaignEvent>> {
        if self.trigger_conditions.is_empty() {
            Ok(vec![self.scheduled()])
        } else {
            self.triggered()
        }
    }

    fn diagnostic(&self) -> Intervention {
        let on_positive = if self.positive_diagnosis_configs.is_empty() {
            PositiveDiagnosis::Event {
                event: TriggerName::from(TriggerName::TESTED_POSITIVE),
            }
        } else {
            let mut interventions = self.positive_diagnosis_configs.clone();
            interventions.push(broadcast(TriggerName::TESTED_POSITIVE));
            PositiveDiagnosis::Config {
                config: Box::new(Intervention::MultiDistributor(MultiDistributor {
                    interventions,
                    ind_restrictions: self.positive_ind_restrictions.clone(),
                })),
            }
        };
        Intervention::Diagnostic(Diagnostic {
            diagnostic_type: self.diagnostic_type,
            threshold: self.threshold,
            on_positive,
        })
    }

    /// Broadcast the received-test event, then run the diagnostic.
    fn test_and_diagnose(&self) -> Intervention {
        Intervention::multi(vec![
            broadcast(self.received_test_event.clone()),
            self.diagnostic(),
        ])
    }

    fn scheduled(&self) -> CampaignEvent {
        let coordinator = EventCoordinator {
            number_distributions: Some(-1),
            repetitions: Some(self.repetitions),
            interval: Some(self.interval),
            coverage: Some(self.coverage),
            target: Some(self.target.clone()),
            node_restrictions: self.node_restrictions.clone(),
            ind_restrictions: self.ind_restrictions.clone(),
            ..EventCoordinator::new(self.test_and_diagnose())
        };
        CampaignEvent::new(self.start_day, self.node_cfg.clone(), coordinator)
            .named(self.event_name.clone())
    }

    fn triggered(&self) -> Result<Vec<CampaignEvent>> {
        let schedule = ReactiveSchedule {
            label: &self.event_name,
            start_day: self.start_day,
            conditions: &self.trigger_conditions,
            repetitions: self.repetitions,
            interval: self.interval,
            delay: self.triggered_delay,
            listening_duration: self.listening_duration,
        };
        let ReactivePlan {
            mut listeners,
            conditions,
            duration,
        } = schedule.plan(&self.node_cfg, &self.node_restrictions)?;
        if conditions.is_empty() {
            return Ok(listeners);
        }

        let listener = HealthTriggered {
            duration: Some(duration),
            coverage: Some(self.coverage),
            target: Some(self.target.clone()),
            residents_only: Some(true),
            blackout: Some(Blackout::first_occurrence_only()),
            node_restrictions: self.node_restrictions.clone(),
            ind_restrictions: self.ind_restrictions.clone(),
            ..HealthTriggered::listening(conditions, self.test_and_diagnose())
        };
        let coordinator = EventCoordinator {
            number_distributions: Some(-1),
            ..EventCoordinator::new(Intervention::HealthTriggered(listener))
        };
        listeners.push(
            CampaignEvent::new(self.start_day, self.node_cfg.clone(), coordinator)
                .named(self.event_name.clone()),
        );
        Ok(listeners)
    }
}

/// Builds `survey` and appends every resulting event to `sink`.
pub fn add_diagnostic_survey(
    sink: &mut impl CampaignSink,
    survey: &DiagnosticSurvey,
) -> Result<()> {
    let events = survey.build()?;
    tracing::info!(
        name = %survey.event_name,
        start_day = survey.start_day,
        triggered = !survey.trigger_conditions.is_empty(),
        events = events.len(),
        "built diagnostic survey"
    );
    for event in events {
        sink.add_event(event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_builder::ConfigBuilder;
    use crate::fragments::property_changer;
    use serde_json::{Value, json};

    fn to_value(event: &CampaignEvent) -> Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn test_scheduled_survey() {
        let survey = DiagnosticSurvey {
            repetitions: 4,
            interval: 90,
            start_day: 10,
            coverage: 0.7,
            ..DiagnosticSurvey::default()
        };
        let events = survey.build().unwrap();
        assert_eq!(events.len(), 1);
        let value = to_value(&events[0]);
        assert_eq!(value["Start_Day"], 10);
        assert_eq!(value["Event_Name"], "Diagnostic Survey");
        let coordinator = &value["Event_Coordinator_Config"];
        assert_eq!(coordinator["Number_Distributions"], -1);
        assert_eq!(coordinator["Number_Repetitions"], 4);
        assert_eq!(coordinator["Timesteps_Between_Repetitions"], 90);
        assert_eq!(coordinator["Demographic_Coverage"], 0.7);
        assert_eq!(coordinator["Target_Demographic"], "Everyone");
        assert!(coordinator.get("Target_Age_Min").is_none());

        let list = &coordinator["Intervention_Config"]["Intervention_List"];
        assert_eq!(
            list[0],
            json!({"class": "BroadcastEvent", "Broadcast_Event": "Received_Test"})
        );
        assert_eq!(list[1]["class"], "MalariaDiagnostic");
        assert_eq!(list[1]["MalariaDiagnostic_Type"], "BLOOD_SMEAR_PARASITES");
        assert_eq!(list[1]["Event_Or_Config"], "Event");
        assert_eq!(list[1]["Positive_Diagnosis_Event"], "TestedPositive");
    }

    #[test]
    fn test_positive_branch_with_restrictions() {
        let survey = DiagnosticSurvey {
            positive_diagnosis_configs: vec![property_changer("Status", "Treated", 0, 1.0)],
            positive_ind_restrictions: vec![PropertyRestriction::new().with("DrugStatus", "None")],
            ind_restrictions: vec![PropertyRestriction::new().with("Risk", "High")],
            ..DiagnosticSurvey::default()
        };
        let value = to_value(&survey.build().unwrap()[0]);
        let coordinator = &value["Event_Coordinator_Config"];
        assert_eq!(
            coordinator["Property_Restrictions_Within_Node"],
            json!([{"Risk": "High"}])
        );
        let diagnostic = &coordinator["Intervention_Config"]["Intervention_List"][1];
        assert_eq!(diagnostic["Event_Or_Config"], "Config");
        let config = &diagnostic["Positive_Diagnosis_Config"];
        assert_eq!(config["class"], "MultiInterventionDistributor");
        assert_eq!(config["Intervention_List"][0]["class"], "PropertyValueChanger");
        assert_eq!(config["Intervention_List"][1]["Broadcast_Event"], "TestedPositive");
        assert_eq!(
            config["Property_Restrictions_Within_Node"],
            json!([{"DrugStatus": "None"}])
        );
    }

    #[test]
    fn test_age_range_target() {
        let survey = DiagnosticSurvey {
            target: TargetDemographic::from_value(&json!({"agemin": 5, "agemax": 15})),
            ..DiagnosticSurvey::default()
        };
        let value = to_value(&survey.build().unwrap()[0]);
        let coordinator = &value["Event_Coordinator_Config"];
        assert_eq!(coordinator["Target_Demographic"], "ExplicitAgeRanges");
        assert_eq!(coordinator["Target_Age_Min"], 5.0);
        assert_eq!(coordinator["Target_Age_Max"], 15.0);
    }

    #[test]
    fn test_single_triggered_survey_listens_directly() {
        let survey = DiagnosticSurvey {
            trigger_conditions: vec!["NewClinicalCase".into()],
            listening_duration: 100,
            ..DiagnosticSurvey::default()
        };
        let events = survey.build().unwrap();
        assert_eq!(events.len(), 1);
        let value = to_value(&events[0]);
        let iv = &value["Event_Coordinator_Config"]["Intervention_Config"];
        assert_eq!(iv["class"], "NodeLevelHealthTriggeredIV");
        assert_eq!(iv["Trigger_Condition_List"], json!(["NewClinicalCase"]));
        assert_eq!(iv["Duration"], 100);
        assert_eq!(iv["Blackout_On_First_Occurrence"], 1);
        let actual = &iv["Actual_IndividualIntervention_Config"];
        assert_eq!(actual["Intervention_List"][0]["Broadcast_Event"], "Received_Test");
        assert_eq!(actual["Intervention_List"][1]["class"], "MalariaDiagnostic");
    }

    #[test]
    fn test_repeated_triggered_survey_synthesizes_listeners() {
        let survey = DiagnosticSurvey {
            trigger_conditions: vec!["NewClinicalCase".into()],
            repetitions: 3,
            interval: 30,
            triggered_delay: 5,
            ..DiagnosticSurvey::default()
        };
        let events = survey.build().unwrap();
        assert_eq!(events.len(), 4);

        let mut names = Vec::new();
        for (index, event) in events[..3].iter().enumerate() {
            let value = to_value(event);
            let iv = &value["Event_Coordinator_Config"]["Intervention_Config"];
            assert_eq!(iv["Trigger_Condition_List"], json!(["NewClinicalCase"]));
            let delayed = &iv["Actual_IndividualIntervention_Config"];
            assert_eq!(delayed["Delay_Period"], 5 + 30 * index as u64);
            names.push(
                delayed["Actual_IndividualIntervention_Configs"][0]["Broadcast_Event"].clone(),
            );
        }
        names.sort_by_key(|n| n.to_string());
        names.dedup();
        assert_eq!(names.len(), 3);

        let survey_event = to_value(&events[3]);
        let iv = &survey_event["Event_Coordinator_Config"]["Intervention_Config"];
        let listening = iv["Trigger_Condition_List"].as_array().unwrap();
        assert_eq!(listening.len(), 3);
        for name in &names {
            assert!(listening.contains(name));
        }
    }

    #[test]
    fn test_scheduled_calls_differ_only_in_start_day() {
        let first = DiagnosticSurvey {
            start_day: 0,
            repetitions: 2,
            ..DiagnosticSurvey::default()
        };
        let second = DiagnosticSurvey {
            start_day: 200,
            ..first.clone()
        };
        let mut a = to_value(&first.build().unwrap()[0]);
        let mut b = to_value(&second.build().unwrap()[0]);
        assert_ne!(a, b);
        a["Start_Day"] = json!(0);
        b["Start_Day"] = json!(0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_triggered_calls_differ_only_in_start_day() {
        let first = DiagnosticSurvey {
            start_day: 0,
            trigger_conditions: vec!["NewClinicalCase".into()],
            listening_duration: 30,
            ..DiagnosticSurvey::default()
        };
        let second = DiagnosticSurvey {
            start_day: 200,
            ..first.clone()
        };
        let mut a = to_value(&first.build().unwrap()[0]);
        let mut b = to_value(&second.build().unwrap()[0]);
        a["Start_Day"] = json!(0);
        b["Start_Day"] = json!(0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_synthesized_names_follow_start_day() {
        let first = DiagnosticSurvey {
            start_day: 0,
            repetitions: 2,
            trigger_conditions: vec!["NewClinicalCase".into()],
            ..DiagnosticSurvey::default()
        };
        let second = DiagnosticSurvey {
            start_day: 200,
            ..first.clone()
        };
        let receiver_conditions = |survey: &DiagnosticSurvey| {
            let events = survey.build().unwrap();
            assert_eq!(events.len(), 3);
            to_value(&events[2])["Event_Coordinator_Config"]["Intervention_Config"]
                ["Trigger_Condition_List"]
                .clone()
        };
        let a = receiver_conditions(&first);
        assert_eq!(a, receiver_conditions(&first));
        assert_ne!(a, receiver_conditions(&second));
    }

    #[test]
    fn test_add_diagnostic_survey_appends() {
        let mut cb = ConfigBuilder::default();
        let survey = DiagnosticSurvey {
            trigger_conditions: vec!["X".into()],
            repetitions: 2,
            ..DiagnosticSurvey::default()
        };
        add_diagnostic_survey(&mut cb, &survey).unwrap();
        assert_eq!(cb.events().len(), 3);
        assert_eq!(cb.events()[2].name.as_deref(), Some("Diagnostic Survey"));
    }
}
