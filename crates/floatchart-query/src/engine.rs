//! The query pipeline: normalize, extract, classify, plan, compile.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use floatchart_llm::ProviderGateway;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{QueryError, Result};
use crate::extractor::{normalize, EntityExtractor};
use crate::gazetteer::Gazetteer;
use crate::intent::{Classification, IntentClassifier, QueryIntent};
use crate::plan::{self, QueryPlan, QuerySettings};
use crate::sql::{self, CompiledQuery};

/// One question from the caller. `turn` is accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub turn: Option<u32>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), turn: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderstoodQuery {
    /// Original text, kept for summaries.
    pub text: String,
    pub classification: Classification,
    pub plan: QueryPlan,
    pub compiled: CompiledQuery,
}

pub struct QueryEngine {
    extractor: EntityExtractor,
    classifier: IntentClassifier,
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(gazetteer: Arc<Gazetteer>, gateway: Option<Arc<ProviderGateway>>, settings: QuerySettings) -> Self {
        Self {
            extractor: EntityExtractor::new(gazetteer),
            classifier: IntentClassifier::new(gateway),
            settings,
        }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub async fn understand(&self, request: &QueryRequest) -> Result<UnderstoodQuery> {
        self.understand_at(request, Utc::now()).await
    }

    /// Same as `understand`, with relative dates resolved against `now`.
    pub async fn understand_at(&self, request: &QueryRequest, now: DateTime<Utc>) -> Result<UnderstoodQuery> {
        let normalized = normalize(&request.text);
        let entities = self.extractor.extract_at(&normalized, now);

        if let Some(phrase) = entities.unresolved_locations.first() {
            if entities.locations.is_empty() {
                warn!(phrase = %phrase, "location did not resolve");
                return Err(QueryError::UnresolvedLocation { phrase: phrase.clone() });
            }
            debug!(ignored = ?entities.unresolved_locations, "unresolved phrases alongside resolved locations");
        }

        let classification = self.classifier.classify(&request.text, &normalized, &entities).await;
        if classification.intent == QueryIntent::Unknown {
            let cause = classification.cause.clone().unwrap_or_else(|| "no intent recognized".to_string());
            return Err(QueryError::AmbiguousIntent { cause });
        }

        let plan = plan::build(classification.intent, entities, &self.settings);
        if let Some(err) = plan.insufficiency() {
            return Err(err);
        }
        let compiled = sql::compile(&plan)?;

        info!(
            intent = %plan.intent,
            shape = ?compiled.result.shape,
            binds = compiled.binds.len(),
            limit = compiled.limit,
            "query compiled"
        );
        Ok(UnderstoodQuery {
            text: request.text.clone(),
            classification,
            plan,
            compiled,
        })
    }
}
