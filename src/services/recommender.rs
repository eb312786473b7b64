use std::sync::Arc;

use crate::{
    config::PipelineConfig,
    error::GenerationError,
    models::{
        AttemptOutcome, Identity, PersonalizationContext, RecommendationRecord,
        RecommendationSource, Recommendations,
    },
    services::{
        cancel::CancelSignal,
        clock::Clock,
        context::{ContextAggregator, ContextSource},
        fallback::fallback_recommendations,
        generation::{ModelInvoker, TextGenerator},
        parser::parse_recommendations,
        prompt::{build_prompt, RecommendationQuery},
        urls::repair_urls,
    },
};

/// Upper bound on records returned for one query
pub const MAX_RECOMMENDATIONS: usize = 10;

/// Orchestrates context, prompt, model, parsing, URL repair and fallback
#[derive(Clone)]
pub struct Recommender {
    aggregator: ContextAggregator,
    invoker: ModelInvoker,
    clock: Arc<dyn Clock>,
}

impl Recommender {
    pub fn new(
        source: Arc<dyn ContextSource>,
        generator: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            aggregator: ContextAggregator::new(source, clock.clone(), config.context_read_timeout),
            invoker: ModelInvoker::new(generator, config),
            clock,
        }
    }

    /// Personalization context for `identity`; never fails
    pub async fn context(&self, identity: Option<&Identity>) -> PersonalizationContext {
        self.aggregator.aggregate(identity).await
    }

    /// Up to [`MAX_RECOMMENDATIONS`] records for `query`, each with a usable URL.
    ///
    /// Never fails: any generation or parse problem yields fallback content.
    pub async fn get_recommendations(
        &self,
        query: &str,
        identity: Option<&Identity>,
        cancel: &CancelSignal,
    ) -> Recommendations {
        let context = self.context(identity).await;
        self.recommend_with_context(query, &context, cancel).await
    }

    /// Same as [`Recommender::get_recommendations`] with an already aggregated context
    pub async fn recommend_with_context(
        &self,
        query: &str,
        context: &PersonalizationContext,
        cancel: &CancelSignal,
    ) -> Recommendations {
        let query = RecommendationQuery::resolve(query);
        let prompt = build_prompt(&query, context, self.clock.today());

        let mut invocation = self.invoker.invoke(&prompt, cancel).await;

        let parsed = match invocation.result {
            Ok(text) => match parse_recommendations(&text) {
                Ok(records) => Some(records),
                Err(e) => {
                    if let Some(last) = invocation.attempts.last_mut() {
                        last.outcome = AttemptOutcome::ParseError;
                    }
                    tracing::warn!(
                        error = %e,
                        response_len = text.len(),
                        "Model response could not be parsed, using fallback"
                    );
                    None
                }
            },
            Err(GenerationError::Cancelled) => {
                tracing::info!(query = %query.raw_text(), "Request cancelled, using fallback");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Generation unavailable, using fallback");
                None
            }
        };

        let recommendations = match parsed {
            Some(records) => Recommendations {
                records: finalize(records),
                source: RecommendationSource::Model,
            },
            None => Recommendations {
                records: finalize(fallback_recommendations(query.raw_text(), context)),
                source: RecommendationSource::Fallback,
            },
        };

        tracing::debug!(attempts = ?invocation.attempts, "Generation attempts");
        tracing::info!(
            query = %query.raw_text(),
            attempts = invocation.attempts.len(),
            source = ?recommendations.source,
            records = recommendations.records.len(),
            "Recommendations ready"
        );

        recommendations
    }
}

fn finalize(mut records: Vec<RecommendationRecord>) -> Vec<RecommendationRecord> {
    records.truncate(MAX_RECOMMENDATIONS);
    repair_urls(records)
}
