//! `market.events` - output of the market-data collectors.

use serde::{Deserialize, Serialize};

use super::{EventKind, EventPayload, EventType, ValidationIssues};

/// Published by a collector after a successful scrape or API pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataCollected {
    /// Collector that produced the data, e.g. `crunchbase`.
    pub collector: String,
    pub industry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venture_id: Option<String>,
    pub data_points: u32,
}

impl MarketDataCollected {
    pub fn new(collector: impl Into<String>, industry: impl Into<String>, data_points: u32) -> Self {
        Self {
            collector: collector.into(),
            industry: industry.into(),
            venture_id: None,
            data_points,
        }
    }

    pub fn for_venture(mut self, venture_id: impl Into<String>) -> Self {
        self.venture_id = Some(venture_id.into());
        self
    }
}

impl EventKind for MarketDataCollected {
    const TYPE: EventType = EventType::MarketDataCollected;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.collector", &self.collector);
        issues.require_non_empty("data.industry", &self.industry);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::MarketDataCollected(self)
    }
}

/// Published when an analysis over collected data is ready for a venture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAnalysisCompleted {
    pub analysis_id: String,
    pub venture_id: String,
    pub summary: String,
}

impl MarketAnalysisCompleted {
    pub fn new(
        analysis_id: impl Into<String>,
        venture_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            venture_id: venture_id.into(),
            summary: summary.into(),
        }
    }
}

impl EventKind for MarketAnalysisCompleted {
    const TYPE: EventType = EventType::MarketAnalysisCompleted;

    fn check(&self, issues: &mut ValidationIssues) {
        issues.require_non_empty("data.analysis_id", &self.analysis_id);
        issues.require_non_empty("data.venture_id", &self.venture_id);
    }

    fn into_payload(self) -> EventPayload {
        EventPayload::MarketAnalysisCompleted(self)
    }
}
