use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::campaign::CampaignEvent;
use crate::error::Result;

/// Where builders deliver what they produce.
pub trait CampaignSink {
    /// Appends one event. Order is preserved verbatim.
    fn add_event(&mut self, event: CampaignEvent);

    /// Merges `params` into the flat parameter map; later keys win.
    fn update_params(&mut self, params: Map<String, Value>);
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    campaign_name: String,
    events: Vec<CampaignEvent>,
    params: Map<String, Value>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new("Malaria campaign")
    }
}

impl ConfigBuilder {
    pub fn new(campaign_name: impl Into<String>) -> Self {
        Self {
            campaign_name: campaign_name.into(),
            events: Vec::new(),
            params: Map::new(),
        }
    }

    pub fn events(&self) -> &[CampaignEvent] {
        &self.events
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn campaign_json(&self) -> Result<Value> {
        Ok(json!({
            "Campaign_Name": self.campaign_name,
            "Use_Defaults": 1,
            "Events": serde_json::to_value(&self.events)?,
        }))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.campaign_json()?)?)
    }

    /// Hex SHA-256 of the serialized campaign. Equal fingerprints mean
    /// byte-identical campaign files.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.campaign_json()?)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

impl CampaignSink for ConfigBuilder {
    fn add_event(&mut self, event: CampaignEvent) {
        tracing::debug!(
            start_day = event.start_day,
            name = event.name.as_deref().unwrap_or(""),
            "adding campaign event"
        );
        self.events.push(event);
    }

    fn update_params(&mut self, params: Map<String, Value>) {
        self.params.extend(params);
    }
}
