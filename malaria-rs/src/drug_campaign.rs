use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::campaign::{
    Blackout, CampaignEvent, DiagnosticType, EventCoordinator, FocalRadius, HealthTriggered,
    Intervention, NodeSelectionType, NodeSelector, PropertyRestriction, TargetDemographic,
};
use crate::config_builder::CampaignSink;
use crate::diagnostic::DiagnosticSurvey;
use crate::drugs::DrugLookup;
use crate::error::{Error, Result};
use crate::fragments::{
    ReactiveSchedule, broadcast, day_offset, delayed_intervention, delayed_or_direct,
    duration_days, focal_broadcast, property_changer,
};
use crate::trigger::TriggerName;

/// Tags describing a campaign, for labelling simulations.
pub type CampaignTags = Map<String, Value>;

const DRUG_STATUS: &str = "DrugStatus";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignType {
    Mda,
    Smc,
    Msat,
    Mtat,
    Fmda,
    Rfmda,
    Rfmsat,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mda => "MDA",
            Self::Smc => "SMC",
            Self::Msat => "MSAT",
            Self::Mtat => "MTAT",
            Self::Fmda => "fMDA",
            Self::Rfmda => "rfMDA",
            Self::Rfmsat => "rfMSAT",
        }
    }

    /// Reactive campaigns respond to successful health-seeking.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Self::Rfmda | Self::Rfmsat)
    }
}

impl FromStr for CampaignType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MDA" => Ok(Self::Mda),
            "SMC" => Ok(Self::Smc),
            "MSAT" => Ok(Self::Msat),
            "MTAT" => Ok(Self::Mtat),
            "fMDA" => Ok(Self::Fmda),
            "rfMDA" => Ok(Self::Rfmda),
            "rfMSAT" => Ok(Self::Rfmsat),
            other => Err(Error::UnknownCampaignType(other.to_string())),
        }
    }
}

impl fmt::Display for CampaignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an unrecognized campaign type is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Fail with [`Error::UnknownCampaignType`].
    #[default]
    Strict,
    /// Emit nothing and carry on.
    Permissive,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DrugCampaign {
    pub campaign_type: String,
    pub drug_code: String,
    pub start_days: Vec<u32>,
    /// Fraction of people at home during the campaign who are reached.
    pub coverage: f64,
    pub repetitions: u32,
    /// Days between repetitions. For rfMDA and rfMSAT, how long reactive
    /// case detection stays active.
    pub interval: u32,
    pub diagnostic_type: DiagnosticType,
    pub diagnostic_threshold: f64,
    pub fmda_radius: FocalRadius,
    pub node_selection_type: NodeSelectionType,
    /// Reactive campaigns only: fraction of index cases that start a response.
    pub trigger_coverage: f64,
    pub snowballs: u32,
    /// Diagnosis to treatment for MSAT and fMDA; index case to response for
    /// reactive campaigns.
    pub treatment_delay: u32,
    pub triggered_campaign_delay: u32,
    pub nodes: Vec<u32>,
    pub target_group: TargetDemographic,
    pub dosing: Option<String>,
    /// When positive, recipients are marked `DrugStatus:RecentDrug` for this
    /// many days and are not dosed again meanwhile.
    pub drug_ineligibility_duration: u32,
    pub node_property_restrictions: Vec<PropertyRestriction>,
    pub ind_property_restrictions: Vec<PropertyRestriction>,
    pub trigger_condition_list: Vec<TriggerName>,
    pub listening_duration: i32,
    pub mode: DispatchMode,
}

impl Default for DrugCampaign {
    fn default() -> Self {
        Self {
            campaign_type: String::new(),
            drug_code: String::new(),
            start_days: Vec::new(),
            coverage: 1.0,
            repetitions: 3,
            interval: 60,
            diagnostic_type: DiagnosticType::TrueParasiteDensity,
            diagnostic_threshold: 40.0,
            fmda_radius: FocalRadius::Household,
            node_selection_type: NodeSelectionType::DistanceOnly,
            trigger_coverage: 1.0,
            snowballs: 0,
            treatment_delay: 0,
            triggered_campaign_delay: 0,
            nodes: Vec::new(),
            target_group: TargetDemographic::Everyone,
            dosing: None,
            drug_ineligibility_duration: 0,
            node_property_restrictions: Vec::new(),
            ind_property_restrictions: Vec::new(),
            trigger_condition_list: Vec::new(),
            listening_duration: -1,
            mode: DispatchMode::Strict,
        }
    }
}

impl DrugCampaign {
    pub fn tags(&self) -> CampaignTags {
        let tags = json!({
            "drug_campaign.type": self.campaign_type,
            "drug_campaign.drugs": self.drug_code,
            "drug_campaign.trigger_coverage": self.trigger_coverage,
            "drug_campaign.coverage": self.coverage,
        });
        match tags {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn first_start_day(&self) -> Result<u32> {
        self.start_days
            .first()
            .copied()
            .ok_or_else(|| Error::NoStartDays(self.campaign_type.clone()))
    }

    fn is_triggered(&self) -> bool {
        !self.trigger_condition_list.is_empty()
    }

    fn survey_template(&self, nodes: &NodeSelector) -> DiagnosticSurvey {
        DiagnosticSurvey {
            coverage: self.coverage,
            repetitions: self.repetitions,
            interval: self.interval,
            target: self.target_group.clone(),
            diagnostic_type: self.diagnostic_type,
            threshold: self.diagnostic_threshold,
            node_cfg: nodes.clone(),
            ind_restrictions: self.ind_property_restrictions.clone(),
            node_restrictions: self.node_property_restrictions.clone(),
            ..DiagnosticSurvey::default()
        }
    }
}

/// Drugs plus whatever every recipient of them also gets.
struct DrugBundle {
    drugs: Vec<Intervention>,
    received: Intervention,
    expire_recent_drugs: Option<Intervention>,
    gate: Option<PropertyRestriction>,
}

impl DrugBundle {
    fn new(drugs: Vec<Intervention>, campaign: &DrugCampaign, kind: CampaignType) -> Self {
        let drugs = match &campaign.dosing {
            Some(dosing) => drugs
                .into_iter()
                .map(|intervention| match intervention {
                    Intervention::AntimalarialDrug(mut drug) => {
                        drug.dosing = Some(dosing.clone());
                        Intervention::AntimalarialDrug(drug)
                    }
                    other => other,
                })
                .collect(),
            None => drugs,
        };

        let received = if kind.is_reactive() {
            TriggerName::RECEIVED_RCD_DRUGS
        } else if campaign.drug_code.contains("Vehicle") {
            TriggerName::RECEIVED_VEHICLE
        } else {
            TriggerName::RECEIVED_CAMPAIGN_DRUGS
        };

        let (expire_recent_drugs, gate) = if campaign.drug_ineligibility_duration > 0 {
            (
                Some(property_changer(
                    DRUG_STATUS,
                    "RecentDrug",
                    campaign.drug_ineligibility_duration,
                    1.0,
                )),
                Some(PropertyRestriction::new().with(DRUG_STATUS, "None")),
            )
        } else {
            (None, None)
        };

        Self {
            drugs,
            received: broadcast(received),
            expire_recent_drugs,
            gate,
        }
    }

    /// Drugs, the received-drugs broadcast, then the recent-drug marker.
    fn treatment(&self) -> Vec<Intervention> {
        self.drugs
            .iter()
            .cloned()
            .chain(std::iter::once(self.received.clone()))
            .chain(self.expire_recent_drugs.iter().cloned())
            .collect()
    }

    /// `lead` first, then the broadcast, the drugs and the marker.
    fn treatment_after(&self, lead: Intervention) -> Vec<Intervention> {
        std::iter::once(lead)
            .chain(std::iter::once(self.received.clone()))
            .chain(self.drugs.iter().cloned())
            .chain(self.expire_recent_drugs.iter().cloned())
            .collect()
    }

    /// `restrictions` with the recent-drug gate folded into each entry.
    fn gated(&self, restrictions: &[PropertyRestriction]) -> Vec<PropertyRestriction> {
        match &self.gate {
            Some(gate) => PropertyRestriction::gated(restrictions, gate),
            None => restrictions.to_vec(),
        }
    }

    fn gate_only(&self) -> Vec<PropertyRestriction> {
        self.gate.iter().cloned().collect()
    }
}

/// Builds `campaign` and appends its events to `sink`.
///
/// Drug lookup failures propagate. An unrecognized campaign type is an
/// error unless the campaign asks for [`DispatchMode::Permissive`].
pub fn add_drug_campaign(
    sink: &mut impl CampaignSink,
    drugs: &impl DrugLookup,
    campaign: &DrugCampaign,
) -> Result<CampaignTags> {
    let kind = match campaign.campaign_type.parse::<CampaignType>() {
        Ok(kind) => Some(kind),
        Err(err) if campaign.mode == DispatchMode::Strict => return Err(err),
        Err(_) => None,
    };

    let drug_configs = drugs.drug_configs(sink, &campaign.drug_code)?;

    let Some(kind) = kind else {
        tracing::warn!(
            campaign_type = %campaign.campaign_type,
            "campaign type not recognized, no events added"
        );
        return Ok(campaign.tags());
    };

    let events = build_drug_campaign(kind, drug_configs, campaign)?;
    tracing::info!(
        campaign_type = %kind,
        drugs = %campaign.drug_code,
        events = events.len(),
        "built drug campaign"
    );
    for event in events {
        sink.add_event(event);
    }
    Ok(campaign.tags())
}

fn build_drug_campaign(
    kind: CampaignType,
    drug_configs: Vec<Intervention>,
    campaign: &DrugCampaign,
) -> Result<Vec<CampaignEvent>> {
    let bundle = DrugBundle::new(drug_configs, campaign, kind);
    let nodes = NodeSelector::from_ids(&campaign.nodes);

    if kind.is_reactive() && campaign.is_triggered() {
        tracing::warn!(
            campaign_type = %kind,
            "reactive campaigns start on Received_Treatment, ignoring trigger_condition_list"
        );
    }

    match kind {
        CampaignType::Mda | CampaignType::Smc => mda(campaign, &bundle, &nodes, kind),
        CampaignType::Msat | CampaignType::Mtat => msat(campaign, &bundle, &nodes),
        CampaignType::Fmda => fmda(campaign, &bundle, &nodes),
        CampaignType::Rfmda => rfmda(campaign, &bundle, &nodes),
        CampaignType::Rfmsat => rfmsat(campaign, &bundle, &nodes),
    }
}

fn mda(
    campaign: &DrugCampaign,
    bundle: &DrugBundle,
    nodes: &NodeSelector,
    kind: CampaignType,
) -> Result<Vec<CampaignEvent>> {
    let distribute = Intervention::multi(bundle.treatment());
    let ind_restrictions = bundle.gated(&campaign.ind_property_restrictions);

    if !campaign.is_triggered() {
        return Ok(campaign
            .start_days
            .iter()
            .map(|&start_day| {
                let coordinator = EventCoordinator {
                    repetitions: Some(campaign.repetitions),
                    interval: Some(campaign.interval),
                    coverage: Some(campaign.coverage),
                    target: Some(campaign.target_group.clone()),
                    node_restrictions: campaign.node_property_restrictions.clone(),
                    ind_restrictions: ind_restrictions.clone(),
                    ..EventCoordinator::new(distribute.clone())
                };
                CampaignEvent::new(start_day, nodes.clone(), coordinator)
            })
            .collect());
    }

    let start_day = campaign.first_start_day()?;
    let schedule = ReactiveSchedule {
        label: kind.as_str(),
        start_day,
        conditions: &campaign.trigger_condition_list,
        repetitions: campaign.repetitions,
        interval: campaign.interval,
        delay: campaign.triggered_campaign_delay,
        listening_duration: campaign.listening_duration,
    };
    let plan = schedule.plan(nodes, &campaign.node_property_restrictions)?;
    let mut events = plan.listeners;
    if plan.conditions.is_empty() {
        return Ok(events);
    }

    let listener = HealthTriggered {
        duration: Some(plan.duration),
        coverage: Some(campaign.coverage),
        target: Some(campaign.target_group.clone()),
        residents_only: Some(true),
        node_restrictions: campaign.node_property_restrictions.clone(),
        ind_restrictions,
        ..HealthTriggered::listening(plan.conditions, distribute)
    };
    events.push(CampaignEvent::new(
        start_day,
        nodes.clone(),
        EventCoordinator::new(Intervention::HealthTriggered(listener)),
    ));
    Ok(events)
}

fn msat(
    campaign: &DrugCampaign,
    bundle: &DrugBundle,
    nodes: &NodeSelector,
) -> Result<Vec<CampaignEvent>> {
    let treatment = bundle.treatment();
    let on_positive = if campaign.treatment_delay == 0 {
        treatment
    } else {
        vec![delayed_intervention(campaign.treatment_delay, treatment)]
    };
    let survey = DiagnosticSurvey {
        positive_diagnosis_configs: on_positive,
        positive_ind_restrictions: bundle.gate_only(),
        ..campaign.survey_template(nodes)
    };

    if campaign.is_triggered() {
        let triggered = DiagnosticSurvey {
            start_day: campaign.first_start_day()?,
            trigger_conditions: campaign.trigger_condition_list.clone(),
            listening_duration: campaign.listening_duration,
            triggered_delay: campaign.triggered_campaign_delay,
            ..survey
        };
        return triggered.build();
    }

    let mut events = Vec::with_capacity(campaign.start_days.len());
    for &start_day in &campaign.start_days {
        events.extend(
            DiagnosticSurvey {
                start_day,
                ..survey.clone()
            }
            .build()?,
        );
    }
    Ok(events)
}

/// Test, then on a positive result broadcast `Give_Drugs_fMDA` to the
/// surrounding nodes, where a second listener hands out the drugs.
fn fmda(
    campaign: &DrugCampaign,
    bundle: &DrugBundle,
    nodes: &NodeSelector,
) -> Result<Vec<CampaignEvent>> {
    let focal = focal_broadcast(
        campaign.fmda_radius,
        campaign.node_selection_type,
        TriggerName::GIVE_DRUGS_FMDA,
    );
    let on_positive = if campaign.treatment_delay > 0 {
        vec![delayed_intervention(campaign.treatment_delay, vec![focal])]
    } else {
        vec![focal]
    };
    let survey = DiagnosticSurvey {
        coverage: campaign.trigger_coverage,
        positive_diagnosis_configs: on_positive,
        ..campaign.survey_template(nodes)
    };

    let distribute_drugs = Intervention::multi(bundle.treatment());
    let ind_restrictions = bundle.gated(&campaign.ind_property_restrictions);
    let distributor = |start_day: u32, duration: i32| {
        let listener = HealthTriggered {
            duration: Some(duration),
            coverage: Some(campaign.coverage),
            residents_only: Some(true),
            blackout: Some(Blackout::one_step(TriggerName::FMDA_BLACKOUT, false)),
            node_restrictions: campaign.node_property_restrictions.clone(),
            ind_restrictions: ind_restrictions.clone(),
            ..HealthTriggered::listening(
                vec![TriggerName::from(TriggerName::GIVE_DRUGS_FMDA)],
                distribute_drugs.clone(),
            )
        };
        CampaignEvent::new(
            start_day,
            nodes.clone(),
            EventCoordinator::new(Intervention::HealthTriggered(listener)),
        )
        .named("Distribute fMDA")
    };

    if campaign.is_triggered() {
        let start_day = campaign.first_start_day()?;
        let triggered = DiagnosticSurvey {
            start_day,
            trigger_conditions: campaign.trigger_condition_list.clone(),
            listening_duration: campaign.listening_duration,
            triggered_delay: campaign.triggered_campaign_delay,
            ..survey
        };
        let duration = if campaign.repetitions > 1 || campaign.triggered_campaign_delay > 0 {
            -1
        } else {
            campaign.listening_duration
        };
        let mut events = triggered.build()?;
        events.push(distributor(start_day, duration));
        return Ok(events);
    }

    // One survey per repetition keeps neighbouring rounds from entangling.
    let mut events = Vec::new();
    for &start_day in &campaign.start_days {
        for repetition in 0..campaign.repetitions {
            let day = day_offset(start_day, campaign.interval, repetition)?;
            events.extend(
                DiagnosticSurvey {
                    start_day: day,
                    repetitions: 1,
                    ..survey.clone()
                }
                .build()?,
            );
            events.push(distributor(day_offset(day, campaign.treatment_delay, 1)?, 2));
        }
    }
    Ok(events)
}

/// A treated case starts a response radiating `Give_Drugs_rfMDA`; anyone
/// reached is dosed without testing.
fn rfmda(
    campaign: &DrugCampaign,
    bundle: &DrugBundle,
    nodes: &NodeSelector,
) -> Result<Vec<CampaignEvent>> {
    let start_day = campaign.first_start_day()?;
    let rcd_window = duration_days(campaign.interval)?;

    let focal = focal_broadcast(
        campaign.fmda_radius,
        campaign.node_selection_type,
        TriggerName::GIVE_DRUGS_RFMDA,
    );
    let trigger = HealthTriggered {
        duration: Some(rcd_window),
        coverage: Some(campaign.trigger_coverage),
        node_restrictions: campaign.node_property_restrictions.clone(),
        ind_restrictions: campaign.ind_property_restrictions.clone(),
        ..HealthTriggered::listening(
            vec![TriggerName::from(TriggerName::RECEIVED_TREATMENT)],
            delayed_or_direct(campaign.treatment_delay, vec![focal]),
        )
    };

    let distribute = HealthTriggered {
        duration: Some(rcd_window),
        coverage: Some(campaign.coverage),
        node_restrictions: campaign.node_property_restrictions.clone(),
        ind_restrictions: bundle.gated(&campaign.ind_property_restrictions),
        ..HealthTriggered::listening(
            vec![TriggerName::from(TriggerName::GIVE_DRUGS_RFMDA)],
            Intervention::multi(bundle.treatment()),
        )
    };

    Ok(vec![
        CampaignEvent::new(
            start_day,
            nodes.clone(),
            EventCoordinator::new(Intervention::HealthTriggered(trigger)),
        )
        .named("Trigger RCD MDA"),
        CampaignEvent::new(
            start_day,
            nodes.clone(),
            EventCoordinator::new(Intervention::HealthTriggered(distribute)),
        )
        .named("Distribute fMDA"),
    ])
}

/// A treated case starts ring 0. Every ring tests whoever its focal
/// broadcast reached and treats positives; while snowballs remain, a
/// positive also radiates the next ring's trigger.
fn rfmsat(
    campaign: &DrugCampaign,
    bundle: &DrugBundle,
    nodes: &NodeSelector,
) -> Result<Vec<CampaignEvent>> {
    let start_day = campaign.first_start_day()?;
    let ring_broadcast = |ring: u32| {
        focal_broadcast(
            campaign.fmda_radius,
            campaign.node_selection_type,
            TriggerName::ring(ring),
        )
    };

    let rcd_window = duration_days(campaign.interval)?;

    // ring 0 goes out as soon as the index case is treated
    let trigger = HealthTriggered {
        duration: Some(rcd_window),
        coverage: Some(campaign.trigger_coverage),
        blackout: Some(Blackout::one_step(TriggerName::RFMSAT_BLACKOUT, true)),
        node_restrictions: campaign.node_property_restrictions.clone(),
        ..HealthTriggered::listening(
            vec![TriggerName::from(TriggerName::RECEIVED_TREATMENT)],
            delayed_intervention(0, vec![ring_broadcast(0)]),
        )
    };
    let mut events = vec![
        CampaignEvent::new(
            start_day,
            nodes.clone(),
            EventCoordinator::new(Intervention::HealthTriggered(trigger)),
        )
        .named("Trigger RCD MSAT"),
    ];

    let survey = DiagnosticSurvey {
        start_day,
        repetitions: 1,
        positive_ind_restrictions: bundle.gate_only(),
        ..campaign.survey_template(nodes)
    };
    for ring in 0..=campaign.snowballs {
        let on_positive = if ring < campaign.snowballs {
            bundle.treatment_after(ring_broadcast(ring + 1))
        } else {
            bundle.treatment()
        };
        let event_name = if ring == 0 {
            "Reactive MSAT level 0".to_string()
        } else {
            format!("Snowball level {ring}")
        };
        events.extend(
            DiagnosticSurvey {
                event_name,
                trigger_conditions: vec![TriggerName::ring(ring)],
                positive_diagnosis_configs: on_positive,
                ..survey.clone()
            }
            .build()?,
        );
    }
    Ok(events)
}
