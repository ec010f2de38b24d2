use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerName(String);

impl TriggerName {
    pub const TESTED_POSITIVE: &'static str = "TestedPositive";
    pub const RECEIVED_TEST: &'static str = "Received_Test";
    pub const RECEIVED_TREATMENT: &'static str = "Received_Treatment";
    pub const RECEIVED_CAMPAIGN_DRUGS: &'static str = "Received_Campaign_Drugs";
    pub const RECEIVED_VEHICLE: &'static str = "Received_Vehicle";
    pub const RECEIVED_RCD_DRUGS: &'static str = "Received_RCD_Drugs";
    pub const GIVE_DRUGS: &'static str = "Give_Drugs";
    pub const GIVE_DRUGS_FMDA: &'static str = "Give_Drugs_fMDA";
    pub const GIVE_DRUGS_RFMDA: &'static str = "Give_Drugs_rfMDA";
    pub const SPRAY_IRS: &'static str = "Spray_IRS";
    pub const NODE_SPRAYED: &'static str = "Node_Sprayed";
    pub const FMDA_BLACKOUT: &'static str = "fMDA_Blackout_Event_Trigger";
    pub const RFMSAT_BLACKOUT: &'static str = "rfMSAT_Blackout_Event_Trigger";
    pub const IRS_BLACKOUT: &'static str = "IRS_Blackout";

    const RING_PREFIX: &'static str = "Diagnostic_Survey_";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Trigger for the `k`-th ring of a snowballing reactive survey.
    pub fn ring(k: u32) -> Self {
        Self(format!("{}{k}", Self::RING_PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TriggerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TriggerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Prefix shared by the per-repetition triggers of one reactive campaign.
///
/// The token is a digest of everything that identifies the campaign, so the
/// same request always yields the same names and two different requests
/// never share listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerNamespace {
    token: String,
}

impl TriggerNamespace {
    pub fn derive(
        label: &str,
        start_day: u32,
        conditions: &[TriggerName],
        delay: u32,
        interval: u32,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update(start_day.to_le_bytes());
        for condition in conditions {
            hasher.update(condition.as_str().as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(delay.to_le_bytes());
        hasher.update(interval.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        Self {
            token: digest[..8].to_string(),
        }
    }

    pub fn name(&self, index: u32) -> TriggerName {
        TriggerName(format!("{}_{index}", self.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_names() {
        assert_eq!(TriggerName::ring(0).as_str(), "Diagnostic_Survey_0");
        assert_eq!(TriggerName::ring(12).as_str(), "Diagnostic_Survey_12");
    }

    #[test]
    fn test_namespace_is_deterministic() {
        let conditions = vec![TriggerName::from("NewClinicalCase")];
        let a = TriggerNamespace::derive("MDA", 10, &conditions, 0, 30);
        let b = TriggerNamespace::derive("MDA", 10, &conditions, 0, 30);
        assert_eq!(a, b);
        assert_eq!(a.name(2), b.name(2));
        assert_ne!(a.name(1), a.name(2));
    }

    #[test]
    fn test_namespace_separates_campaigns() {
        let conditions = vec![TriggerName::from("NewClinicalCase")];
        let a = TriggerNamespace::derive("MDA", 10, &conditions, 0, 30);
        let b = TriggerNamespace::derive("MDA", 11, &conditions, 0, 30);
        let c = TriggerNamespace::derive("Diagnostic Survey", 10, &conditions, 0, 30);
        assert_ne!(a.name(0), b.name(0));
        assert_ne!(a.name(0), c.name(0));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let name = TriggerName::from(TriggerName::SPRAY_IRS);
        assert_eq!(serde_json::to_value(&name).unwrap(), "Spray_IRS");
    }
}
