use crate::campaign::{
    CampaignEvent, DelayDistribution, DelayedIntervention, EventCoordinator, FocalBroadcast,
    FocalRadius, HealthTriggered, Intervention, NodePropertyChanger, NodeSelectionType,
    NodeSelector, PropertyChanger, PropertyRestriction,
};
use crate::error::{Error, Result};
use crate::trigger::{TriggerName, TriggerNamespace};

/// `base + step * count`, failing instead of wrapping.
pub fn day_offset(base: u32, step: u32, count: u32) -> Result<u32> {
    step.checked_mul(count)
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| Error::DayOverflow(format!("{base} + {step} x {count}")))
}

/// A day count as the simulator's signed `Duration`.
pub fn duration_days(days: u32) -> Result<i32> {
    i32::try_from(days).map_err(|_| Error::DayOverflow(format!("duration of {days} days")))
}

pub fn broadcast(event: impl Into<TriggerName>) -> Intervention {
    Intervention::BroadcastEvent {
        event: event.into(),
    }
}

/// Sets an individual property. `revert_after == 0` leaves it set for good.
pub fn property_changer(
    key: &str,
    value: &str,
    revert_after: u32,
    daily_probability: f64,
) -> Intervention {
    Intervention::PropertyValueChanger(PropertyChanger {
        key: key.to_string(),
        value: value.to_string(),
        daily_probability,
        maximum_duration: 0,
        revert: revert_after,
    })
}

pub fn node_property_changer(
    key: &str,
    value: &str,
    revert_after: u32,
    daily_probability: f64,
) -> Intervention {
    Intervention::NodePropertyValueChanger(NodePropertyChanger {
        key_value: format!("{key}:{value}"),
        daily_probability,
        maximum_duration: 0,
        revert: revert_after,
    })
}

pub fn focal_broadcast(
    radius: FocalRadius,
    node_selection: NodeSelectionType,
    event_trigger: impl Into<TriggerName>,
) -> Intervention {
    Intervention::FocalBroadcast(FocalBroadcast {
        event_trigger: event_trigger.into(),
        include_my_node: true,
        node_selection,
        radius,
    })
}

pub fn delayed_intervention(delay: u32, configs: Vec<Intervention>) -> Intervention {
    Intervention::DelayedIntervention(DelayedIntervention {
        distribution: DelayDistribution::FixedDuration,
        period: delay,
        configs,
    })
}

/// Like [`delayed_intervention`], but a zero delay hands back the
/// interventions themselves instead of an empty wrapper.
pub fn delayed_or_direct(delay: u32, mut configs: Vec<Intervention>) -> Intervention {
    if delay > 0 {
        return delayed_intervention(delay, configs);
    }
    if configs.len() == 1 {
        configs.remove(0)
    } else {
        Intervention::multi(configs)
    }
}

/// Listener that, `delay` days after any of `conditions`, broadcasts
/// `broadcast_name` to the individual that triggered it.
pub fn delayed_trigger_listener(
    start_day: u32,
    nodes: &NodeSelector,
    delay: u32,
    conditions: &[TriggerName],
    listening_duration: i32,
    node_restrictions: &[PropertyRestriction],
    broadcast_name: TriggerName,
) -> CampaignEvent {
    let listener = HealthTriggered {
        duration: Some(listening_duration),
        residents_only: Some(true),
        node_restrictions: node_restrictions.to_vec(),
        ..HealthTriggered::listening(
            conditions.to_vec(),
            delayed_intervention(delay, vec![broadcast(broadcast_name)]),
        )
    };
    CampaignEvent::new(
        start_day,
        nodes.clone(),
        EventCoordinator::new(Intervention::HealthTriggered(listener)),
    )
}

/// Timing of a campaign that starts on a trigger rather than a date.
pub struct ReactiveSchedule<'a> {
    /// Distinguishes this campaign's synthesized trigger names.
    pub label: &'a str,
    pub start_day: u32,
    pub conditions: &'a [TriggerName],
    pub repetitions: u32,
    pub interval: u32,
    pub delay: u32,
    pub listening_duration: i32,
}

/// What the receiving event should listen for, plus the listeners that
/// must be emitted ahead of it.
pub struct ReactivePlan {
    pub listeners: Vec<CampaignEvent>,
    pub conditions: Vec<TriggerName>,
    pub duration: i32,
}

impl ReactiveSchedule<'_> {
    pub fn synthesizes(&self) -> bool {
        self.repetitions > 1 || self.delay > 0
    }

    /// Repetition `i` fires `delay + i * interval` days after the trigger
    /// through its own listener and name. Without repeats or delay the
    /// receiver listens on the original conditions directly.
    pub fn plan(
        &self,
        nodes: &NodeSelector,
        node_restrictions: &[PropertyRestriction],
    ) -> Result<ReactivePlan> {
        if !self.synthesizes() {
            return Ok(ReactivePlan {
                listeners: Vec::new(),
                conditions: self.conditions.to_vec(),
                duration: self.listening_duration,
            });
        }

        let namespace = TriggerNamespace::derive(
            self.label,
            self.start_day,
            self.conditions,
            self.delay,
            self.interval,
        );
        let mut listeners = Vec::with_capacity(self.repetitions as usize);
        let mut conditions = Vec::with_capacity(self.repetitions as usize);
        for repetition in 0..self.repetitions {
            let name = namespace.name(repetition);
            listeners.push(delayed_trigger_listener(
                self.start_day,
                nodes,
                day_offset(self.delay, self.interval, repetition)?,
                self.conditions,
                self.listening_duration,
                node_restrictions,
                name.clone(),
            ));
            conditions.push(name);
        }

        // the per-repetition listeners bound the listening window
        Ok(ReactivePlan {
            listeners,
            conditions,
            duration: -1,
        })
    }
}
