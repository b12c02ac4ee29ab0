//! Subject classification.
//!
//! Per subject, the provider mode matrix decides which stages run:
//!
//! | embeddings | LLM   | outcome                                        |
//! |------------|-------|------------------------------------------------|
//! | on         | on    | similarity gate, then LLM confirmation         |
//! | on         | off   | similarity above threshold is final            |
//! | off        | on    | LLM only                                       |
//! | off        | off   | never matches                                  |
//!
//! A subject's own [`MlMethod`] can further switch off either stage.
//!
//! Providers are rebuilt whenever the inference settings change, and the
//! embedding and verdict caches are scoped to one provider set.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use veil_core::text::{preprocess_for_ml, should_text_be_skipped_ml};
use veil_core::{InferenceSettings, MlMethod, MlSubject};
use veil_settings::ClassifierSettings;

use crate::batcher::EmbeddingBatcher;
use crate::budget::BudgetGuard;
use crate::errors::Result;
use crate::factory::{InferenceSettingsProvider, ProviderFactory};
use crate::prompts::{
    CLASSIFY_SYSTEM_PROMPT, Verdict, classification_user_message, keyword_system_prompt,
    keyword_user_message, parse_classification, parse_keywords,
};
use crate::provider::CompletionProvider;
use crate::single_flight::SingleFlight;
use crate::vector::{cosine_similarity, mean_vector};

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Embeddings through the batcher, cached per text.
struct Embedder {
    batcher: EmbeddingBatcher,
    cache: SingleFlight<String, Arc<Vec<f32>>>,
}

impl Embedder {
    async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>> {
        let batcher = self.batcher.clone();
        let owned = text.to_string();
        self.cache
            .run(owned.clone(), move || async move {
                batcher.embed(owned).await.map(Arc::new)
            })
            .await
    }
}

/// Providers and caches built for one settings snapshot.
struct Pipeline {
    settings: InferenceSettings,
    embedder: Option<Embedder>,
    completer: Option<Arc<dyn CompletionProvider>>,
    verdicts: SingleFlight<String, Arc<Vec<Verdict>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Negative,
    Positive,
    NeedsLlm,
}

// ─────────────────────────────────────────────────────────────────────────────
// Classifier
// ─────────────────────────────────────────────────────────────────────────────

/// Decides whether text belongs to any of a set of subjects.
pub struct SemanticClassifier {
    config: ClassifierSettings,
    settings: Arc<dyn InferenceSettingsProvider>,
    factory: Arc<dyn ProviderFactory>,
    budget: BudgetGuard,
    pipeline: Mutex<Option<Arc<Pipeline>>>,
}

impl SemanticClassifier {
    /// Create a classifier. Nothing is built until the first call.
    pub fn new(
        config: ClassifierSettings,
        settings: Arc<dyn InferenceSettingsProvider>,
        factory: Arc<dyn ProviderFactory>,
        budget: BudgetGuard,
    ) -> Self {
        Self {
            config,
            settings,
            factory,
            budget,
            pipeline: Mutex::new(None),
        }
    }

    /// Whether any semantic stage is configured.
    pub async fn is_configured(&self) -> Result<bool> {
        Ok(self.settings.current().await?.any_enabled())
    }

    async fn pipeline(&self) -> Result<Arc<Pipeline>> {
        let settings = self.settings.current().await?;
        let cached = self.pipeline.lock().clone();
        if let Some(existing) = cached
            && existing.settings == settings
        {
            return Ok(existing);
        }

        let embedder = self.factory.embedding_provider(&settings)?.map(|provider| {
            let budget = provider.is_billed().then(|| self.budget.clone());
            Embedder {
                batcher: EmbeddingBatcher::new(
                    provider,
                    budget,
                    self.config.max_batch_size,
                    Duration::from_millis(self.config.batch_window_ms),
                ),
                cache: SingleFlight::new(),
            }
        });
        let completer = self.factory.completion_provider(&settings)?;
        info!(
            embed = ?settings.embed_type,
            llm = ?settings.llm_type,
            "inference pipeline built"
        );
        let pipeline = Arc::new(Pipeline {
            settings,
            embedder,
            completer,
            verdicts: SingleFlight::new(),
        });
        *self.pipeline.lock() = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    // ── Population ──────────────────────────────────────────────────

    /// Fill in a subject's keywords and averaged embedding if missing.
    ///
    /// Returns `true` when the subject changed and should be persisted. With
    /// embeddings disabled there is nothing to populate.
    pub async fn ensure_populated(&self, subject: &mut MlSubject) -> Result<bool> {
        let pipeline = self.pipeline().await?;
        let Some(embedder) = &pipeline.embedder else {
            return Ok(false);
        };
        if subject.is_populated() {
            return Ok(false);
        }

        let keywords = match subject.embedding_keywords.clone().filter(|k| !k.is_empty()) {
            Some(existing) => existing,
            None => self.synthesize_keywords(&pipeline, &subject.description).await?,
        };
        let vectors: Vec<Vec<f32>> = join_all(keywords.iter().map(|k| embedder.embed(k)))
            .await
            .into_iter()
            .map(|v| v.map(|v| v.as_ref().clone()))
            .collect::<Result<_>>()?;

        subject.embedding = mean_vector(&vectors)?;
        subject.embedding_keywords = Some(keywords);
        info!(
            subject = %subject.description,
            keywords = subject.embedding_keywords.as_ref().map_or(0, Vec::len),
            "subject populated"
        );
        Ok(true)
    }

    /// Populate every subject concurrently.
    ///
    /// Returns one result per subject, in order. A failure leaves only its
    /// own subject unpopulated; the others keep their new state.
    pub async fn populate_subjects(&self, subjects: &mut [MlSubject]) -> Vec<Result<bool>> {
        join_all(subjects.iter_mut().map(|s| self.ensure_populated(s))).await
    }

    async fn synthesize_keywords(&self, pipeline: &Pipeline, description: &str) -> Result<Vec<String>> {
        let fallback = vec![description.to_string()];
        let Some(completer) = &pipeline.completer else {
            return Ok(fallback);
        };
        let system = keyword_system_prompt(self.config.keyword_count);
        let user = keyword_user_message(description);
        for attempt in 0..=self.config.parse_retries {
            let raw = complete_billed(completer.as_ref(), &self.budget, &system, &user).await?;
            if let Some(mut keywords) = parse_keywords(&raw) {
                keywords.truncate(self.config.keyword_count.max(1));
                return Ok(keywords);
            }
            debug!(attempt, subject = %description, "unparseable keyword reply");
        }
        warn!(subject = %description, "keyword synthesis failed, using description");
        Ok(fallback)
    }

    // ── Classification ──────────────────────────────────────────────

    /// Index of the first subject the text matches, if any.
    ///
    /// Texts shorter than the minimum length after preprocessing never match
    /// and cost nothing. Unpopulated subjects are skipped on the embedding
    /// path; call [`Self::populate_subjects`] first.
    pub async fn classify(
        &self,
        text: &str,
        subjects: &[MlSubject],
        default_method: MlMethod,
    ) -> Result<Option<usize>> {
        let prepared = preprocess_for_ml(text);
        if subjects.is_empty() || should_text_be_skipped_ml(&prepared, self.config.min_text_length) {
            return Ok(None);
        }
        let pipeline = self.pipeline().await?;

        let mut stages = Vec::with_capacity(subjects.len());
        let mut text_vector: Option<Arc<Vec<f32>>> = None;
        for subject in subjects {
            let stage = self
                .stage_for(&pipeline, subject, default_method, &prepared, &mut text_vector)
                .await?;
            stages.push(stage);
            if stage == Stage::Positive {
                break;
            }
        }

        let positive = stages.iter().position(|s| *s == Stage::Positive);
        let needs_llm: Vec<usize> = stages
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == Stage::NeedsLlm)
            .map(|(i, _)| i)
            .collect();
        if needs_llm.is_empty() {
            return Ok(positive);
        }

        let descriptions: Vec<&str> = needs_llm
            .iter()
            .map(|&i| subjects[i].description.as_str())
            .collect();
        let verdicts = match self.confirm(&pipeline, &prepared, &descriptions).await {
            Ok(verdicts) => verdicts,
            Err(e) if e.is_budget_exceeded() && positive.is_some() => {
                warn!(error = %e, "confirmation skipped, keeping embedding match");
                return Ok(positive);
            }
            Err(e) => return Err(e),
        };
        let confirmed = needs_llm
            .iter()
            .zip(verdicts.iter())
            .find(|(_, v)| v.is_match())
            .map(|(&i, _)| i);

        let winner = match (confirmed, positive) {
            (Some(c), Some(p)) => Some(c.min(p)),
            (c, p) => c.or(p),
        };
        if let Some(i) = winner {
            info!(subject = %subjects[i].description, "text matched subject");
        }
        Ok(winner)
    }

    async fn stage_for(
        &self,
        pipeline: &Pipeline,
        subject: &MlSubject,
        default_method: MlMethod,
        prepared: &str,
        text_vector: &mut Option<Arc<Vec<f32>>>,
    ) -> Result<Stage> {
        let method = subject.effective_method(default_method);
        let use_llm = pipeline.completer.is_some() && method.allows_llm();
        let embedder = pipeline.embedder.as_ref().filter(|_| method.allows_embeddings());

        let Some(embedder) = embedder else {
            return Ok(if use_llm { Stage::NeedsLlm } else { Stage::Negative });
        };
        let Some(subject_vector) = &subject.embedding else {
            debug!(subject = %subject.description, "subject has no embedding, skipping");
            return Ok(Stage::Negative);
        };

        let vector = if let Some(v) = text_vector.as_ref() {
            Arc::clone(v)
        } else {
            let v = embedder.embed(prepared).await?;
            *text_vector = Some(Arc::clone(&v));
            v
        };
        let similarity = cosine_similarity(subject_vector, &vector)?;
        debug!(subject = %subject.description, similarity, "embedding similarity");
        if similarity <= self.config.similarity_threshold {
            return Ok(Stage::Negative);
        }
        Ok(if use_llm { Stage::NeedsLlm } else { Stage::Positive })
    }

    async fn confirm(&self, pipeline: &Pipeline, text: &str, descriptions: &[&str]) -> Result<Arc<Vec<Verdict>>> {
        let Some(completer) = pipeline.completer.clone() else {
            return Ok(Arc::new(vec![Verdict::No; descriptions.len()]));
        };
        let user = classification_user_message(text, descriptions);
        let key = format!("{CLASSIFY_SYSTEM_PROMPT}\n{user}");
        let budget = self.budget.clone();
        let retries = self.config.parse_retries;
        let expected = descriptions.len();
        pipeline
            .verdicts
            .run(key, move || async move {
                for attempt in 0..=retries {
                    let raw = complete_billed(completer.as_ref(), &budget, CLASSIFY_SYSTEM_PROMPT, &user).await?;
                    if let Some(verdicts) = parse_classification(&raw, expected) {
                        return Ok(Arc::new(verdicts));
                    }
                    debug!(attempt, "unparseable classification reply");
                }
                warn!(attempts = retries + 1, "classification reply never parsed, treating as no match");
                Ok(Arc::new(vec![Verdict::No; expected]))
            })
            .await
    }
}

/// One completion with the budget checked first and spend recorded after.
async fn complete_billed(
    completer: &dyn CompletionProvider,
    budget: &BudgetGuard,
    system: &str,
    user: &str,
) -> Result<String> {
    let billed = completer.is_billed();
    if billed {
        budget.check().await?;
    }
    let completion = completer.complete(system, user).await?;
    if billed {
        let _ = budget.record(completer.model(), completion.usage).await?;
    }
    Ok(completion.text)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
