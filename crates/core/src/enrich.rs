//! Optional human-readable metadata for extracted logic.
//!
//! Enrichers run after compilation is complete and only annotate. A failing
//! enricher is logged and skipped.

use std::collections::BTreeMap;

use serde::Serialize;
use sheetlogic_primitives::Coordinate;
use thiserror::Error;

use crate::compiler::LogicExtractionResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellAnnotation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    /// Business name for the whole cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    pub cells: BTreeMap<Coordinate, CellAnnotation>,
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Enricher unavailable: {0}")]
    Unavailable(String),
    #[error("Enricher returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Adds names and descriptions to one cluster's extracted logic.
pub trait RuleEnricher: Send + Sync {
    fn enrich(&self, result: &LogicExtractionResult) -> Result<Enrichment, EnrichmentError>;
}

/// Attaches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

impl RuleEnricher for NoopEnricher {
    fn enrich(&self, _result: &LogicExtractionResult) -> Result<Enrichment, EnrichmentError> {
        Ok(Enrichment::default())
    }
}
