use serde::Deserialize;

use crate::campaign::{
    Blackout, CampaignEvent, EventCoordinator, FocalRadius, HealthTriggered, Intervention,
    NodeSelectionType, NodeSelector, PropertyRestriction, SpaceSpraying, WaningEffect,
};
use crate::config_builder::CampaignSink;
use crate::fragments::{broadcast, delayed_intervention, focal_broadcast, node_property_changer};
use crate::trigger::TriggerName;

const SPRAY_STATUS: &str = "SprayStatus";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReactiveIrs {
    pub start_day: u32,
    /// How long treated cases keep triggering sprays.
    pub duration: i32,
    pub trigger_coverage: f64,
    pub irs_coverage: f64,
    pub node_selection_type: NodeSelectionType,
    pub reactive_radius: FocalRadius,
    /// Days a sprayed node is skipped by later responses.
    pub irs_ineligibility_duration: u32,
    pub delay: u32,
    pub initial_killing: f64,
    pub box_duration: f64,
    pub nodes: Vec<u32>,
    pub node_property_restrictions: Vec<PropertyRestriction>,
}

impl Default for ReactiveIrs {
    fn default() -> Self {
        Self {
            start_day: 0,
            duration: 10000,
            trigger_coverage: 1.0,
            irs_coverage: 1.0,
            node_selection_type: NodeSelectionType::DistanceOnly,
            reactive_radius: FocalRadius::Household,
            irs_ineligibility_duration: 60,
            delay: 7,
            initial_killing: 0.5,
            box_duration: 90.0,
            nodes: Vec::new(),
            node_property_restrictions: Vec::new(),
        }
    }
}

impl ReactiveIrs {
    fn spray(&self) -> Intervention {
        Intervention::SpaceSpraying(SpaceSpraying {
            cost: 1.0,
            habitat_target: "ALL_HABITATS".to_string(),
            kill_target: "SpaceSpray_Indoor".to_string(),
            killing: WaningEffect::Box {
                initial_effect: self.initial_killing,
                decay_time_constant: self.box_duration,
            },
            reduction: WaningEffect::Box {
                initial_effect: 0.0,
                decay_time_constant: 365.0,
            },
        })
    }

    /// A treated case asks surrounding nodes to spray after `delay` days.
    /// Nodes sprayed within the ineligibility window ignore the request.
    pub fn build(&self) -> Vec<CampaignEvent> {
        let nodes = NodeSelector::from_ids(&self.nodes);

        let request = HealthTriggered {
            duration: Some(self.duration),
            coverage: Some(self.trigger_coverage),
            ..HealthTriggered::listening(
                vec![TriggerName::from(TriggerName::RECEIVED_TREATMENT)],
                delayed_intervention(
                    self.delay,
                    vec![focal_broadcast(
                        self.reactive_radius,
                        self.node_selection_type,
                        TriggerName::SPRAY_IRS,
                    )],
                ),
            )
        };
        let trigger = CampaignEvent::new(
            self.start_day,
            nodes.clone(),
            EventCoordinator {
                node_restrictions: self.node_property_restrictions.clone(),
                ..EventCoordinator::new(Intervention::HealthTriggered(request))
            },
        )
        .named("Trigger Reactive IRS");

        let not_recently_sprayed = PropertyRestriction::new().with(SPRAY_STATUS, "None");
        let spray = HealthTriggered {
            coverage: Some(self.irs_coverage),
            blackout: Some(Blackout::one_step(TriggerName::IRS_BLACKOUT, true)),
            node_restrictions: PropertyRestriction::gated(
                &self.node_property_restrictions,
                &not_recently_sprayed,
            ),
            ..HealthTriggered::listening(
                vec![TriggerName::from(TriggerName::SPRAY_IRS)],
                Intervention::multi(vec![
                    self.spray(),
                    broadcast(TriggerName::NODE_SPRAYED),
                    node_property_changer(
                        SPRAY_STATUS,
                        "RecentSpray",
                        self.irs_ineligibility_duration,
                        1.0,
                    ),
                ]),
            )
        };
        let distribute = CampaignEvent::new(
            self.start_day,
            nodes,
            EventCoordinator::new(Intervention::HealthTriggered(spray)),
        )
        .named("Distribute IRS");

        vec![trigger, distribute]
    }
}

pub fn add_reactive_node_irs(sink: &mut impl CampaignSink, irs: &ReactiveIrs) {
    tracing::info!(
        start_day = irs.start_day,
        radius_km = irs.reactive_radius.km(),
        "built reactive IRS"
    );
    for event in irs.build() {
        sink.add_event(event);
    }
}
