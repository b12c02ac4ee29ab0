//! One reconciliation pass over a page.
//!
//! A pass re-derives which candidates should be filtered:
//!
//! 1. drop tracking for elements that left the document;
//! 2. on a disabled site, unfilter everything and stop;
//! 3. load lists, subjects, and preferences;
//! 4. unfilter elements whose word, subject, or effective action is gone;
//! 5. evaluate every candidate concurrently, lexical before semantic.
//!
//! When lists, subjects, or preferences differ from the previous pass,
//! unfiltered elements are evaluated again even if their text did not change.
//!
//! Passes are stamped with a generation. A semantic verdict that arrives
//! after a newer pass started is discarded and the element is left for the
//! next pass. Transient classifier failures fail open: the element stays
//! unfiltered and is retried on a later pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use veil_core::text::content_hash;
use veil_core::{FilterAction, FilterList, MlMethod, MlSubject};
use veil_inference::{InferenceError, SemanticClassifier};
use veil_store::{BlacklistRepository, PreferencesRepository, StoreGateway, SubjectRepository};

use crate::dom::{ElementId, PageDom};
use crate::effects;
use crate::errors::{EngineError, Result};
use crate::lexical::FilterSets;
use crate::site::SiteSupport;
use crate::state::{FilterCause, FilterState};
use crate::stats::StatsAggregator;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// What one pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// Generation stamp of the pass.
    pub generation: u64,
    /// The site was disabled and everything was unfiltered.
    pub blacklisted: bool,
    /// Candidates returned by site support.
    pub candidates: usize,
    /// Filters applied.
    pub filtered: usize,
    /// Filters removed.
    pub unfiltered: usize,
    /// Candidates skipped because their text did not change.
    pub skipped_unchanged: usize,
    /// Candidates skipped because the user ignored them.
    pub skipped_ignored: usize,
    /// Filtered elements dropped after leaving the document.
    pub pruned: usize,
    /// Semantic verdicts discarded because a newer pass started.
    pub stale_discarded: usize,
    /// Candidates whose classification failed transiently.
    pub ml_errors: usize,
}

/// Inputs loaded once per pass.
#[derive(Clone, PartialEq)]
struct Snapshot {
    lists: Vec<Arc<FilterList>>,
    subjects: Vec<MlSubject>,
    default_action: FilterAction,
    default_method: MlMethod,
    semantic: bool,
}

impl Snapshot {
    fn action_for_word(&self, word: &str, list_name: &str) -> Option<FilterAction> {
        let containing = |l: &&Arc<FilterList>| l.trie.word_exists(word);
        self.lists
            .iter()
            .filter(containing)
            .find(|l| l.list_name == list_name)
            .or_else(|| self.lists.iter().find(containing))
            .map(|l| l.effective_action(self.default_action))
    }

    fn action_for_subject(&self, description: &str) -> Option<FilterAction> {
        if !self.semantic {
            return None;
        }
        self.subjects
            .iter()
            .find(|s| s.description == description)
            .map(|s| s.effective_action(self.default_action))
    }
}

enum Outcome {
    Ignored,
    Unchanged,
    Clean,
    Filtered,
    Stale,
    MlError,
}

struct Evaluation {
    unfiltered: bool,
    outcome: Result<Outcome>,
}

fn is_fatal(e: &InferenceError) -> bool {
    e.is_budget_exceeded() || e.is_missing_config()
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciler
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the filter state of one page.
pub struct Reconciler {
    dom: Arc<dyn PageDom>,
    site: Arc<dyn SiteSupport>,
    sets: FilterSets,
    subjects: SubjectRepository,
    prefs: PreferencesRepository,
    blacklist: BlacklistRepository,
    classifier: Option<Arc<SemanticClassifier>>,
    stats: Arc<StatsAggregator>,
    state: Mutex<FilterState>,
    last_inputs: Mutex<Option<Snapshot>>,
    generation: AtomicU64,
}

impl Reconciler {
    /// Create a reconciler for one page.
    ///
    /// Without a classifier, subjects are ignored and only lists apply.
    pub fn new(
        dom: Arc<dyn PageDom>,
        site: Arc<dyn SiteSupport>,
        gateway: &StoreGateway,
        classifier: Option<Arc<SemanticClassifier>>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            dom,
            site,
            sets: FilterSets::new(gateway),
            subjects: SubjectRepository::new(gateway.clone()),
            prefs: PreferencesRepository::new(gateway.clone()),
            blacklist: BlacklistRepository::new(gateway.clone()),
            classifier,
            stats,
            state: Mutex::new(FilterState::new()),
            last_inputs: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Generation of the most recent pass.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether the element is currently filtered.
    pub fn is_filtered(&self, el: ElementId) -> bool {
        self.state.lock().is_filtered(el)
    }

    /// Filtered elements in id order.
    pub fn filtered_elements(&self) -> Vec<ElementId> {
        self.state.lock().filtered_ids()
    }

    /// Cause of an element's filter.
    pub fn cause_of(&self, el: ElementId) -> Option<FilterCause> {
        self.state.lock().filtered(el).map(|e| e.cause.clone())
    }

    /// Run one pass.
    ///
    /// Every candidate evaluation settles before this returns. A double
    /// apply is reported first; otherwise a budget or configuration failure
    /// from the classifier is reported after the lexical work is done.
    pub async fn reconcile(&self) -> Result<PassReport> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = PassReport {
            generation,
            pruned: self.prune_disconnected(),
            ..PassReport::default()
        };

        let host = self.dom.hostname();
        if self.blacklist.is_disabled(&host).await? {
            report.blacklisted = true;
            report.unfiltered = self.unfilter_all();
            info!(%host, unfiltered = report.unfiltered, "site disabled, filters cleared");
            return Ok(report);
        }

        let (snapshot, mut fatal) = self.snapshot().await?;
        report.unfiltered += self.reconcile_existing(&snapshot);
        self.invalidate_if_changed(&snapshot);

        let candidates = self.site.candidates(self.dom.as_ref());
        report.candidates = candidates.len();
        let evaluations = join_all(
            candidates
                .iter()
                .map(|el| self.evaluate(*el, &snapshot, generation)),
        )
        .await;

        let mut double_apply = None;
        for evaluation in evaluations {
            if evaluation.unfiltered {
                report.unfiltered += 1;
            }
            match evaluation.outcome {
                Ok(Outcome::Ignored) => report.skipped_ignored += 1,
                Ok(Outcome::Unchanged) => report.skipped_unchanged += 1,
                Ok(Outcome::Clean) => {}
                Ok(Outcome::Filtered) => report.filtered += 1,
                Ok(Outcome::Stale) => report.stale_discarded += 1,
                Ok(Outcome::MlError) => report.ml_errors += 1,
                Err(EngineError::Inference(e)) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    if double_apply.is_none() {
                        double_apply = Some(e);
                    }
                }
            }
        }

        debug!(
            generation,
            candidates = report.candidates,
            filtered = report.filtered,
            unfiltered = report.unfiltered,
            "reconciliation pass done"
        );
        if let Some(e) = double_apply {
            return Err(e);
        }
        if let Some(e) = fatal {
            return Err(e.into());
        }
        Ok(report)
    }

    /// Remove an element's filter and exclude it until re-allowed.
    ///
    /// Returns whether a filter was removed.
    pub fn unfilter_and_ignore(&self, el: ElementId) -> bool {
        let mut state = self.state.lock();
        let _ = state.ignore(el);
        let _ = state.evict_processed(el);
        let removed = self.unfilter_locked(&mut state, el);
        if removed {
            info!(element = %el, "element unfiltered and ignored");
        }
        removed
    }

    /// Let an ignored element be evaluated again on the next pass.
    ///
    /// Returns whether it was ignored.
    pub fn reallow(&self, el: ElementId) -> bool {
        let mut state = self.state.lock();
        let _ = state.evict_processed(el);
        state.unignore(el)
    }

    /// Drop tracking for elements no longer in the document. Statistics are
    /// not touched. Returns the number of filtered elements dropped.
    pub fn prune_disconnected(&self) -> usize {
        let dom = Arc::clone(&self.dom);
        let dropped = self.state.lock().retain_live(|el| dom.is_connected(el));
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "pruned disconnected elements");
        }
        dropped.len()
    }

    // ── Pass steps ──────────────────────────────────────────────────

    async fn snapshot(&self) -> Result<(Snapshot, Option<InferenceError>)> {
        let lists = self.sets.load().await?;
        let mut subjects = self.subjects.subjects().await?;
        let default_action = self.prefs.default_action().await?;
        let default_method = self.prefs.ml_method().await?;

        let ml_enabled = self.prefs.ml_enabled().await?;

        let classifier = self
            .classifier
            .as_ref()
            .filter(|_| ml_enabled && !subjects.is_empty());
        let semantic = match classifier {
            Some(c) => c.is_configured().await?,
            None => false,
        };

        // Unpopulated subjects never match on embeddings, so a failure only
        // takes its own subject out of this pass.
        let mut fatal = None;
        if semantic && let Some(classifier) = classifier {
            let results = classifier.populate_subjects(&mut subjects).await;
            for (subject, result) in subjects.iter().zip(results) {
                match result {
                    Ok(true) => self.subjects.save_subject(subject).await?,
                    Ok(false) => {}
                    Err(e) if is_fatal(&e) => {
                        warn!(subject = %subject.description, error = %e, "subject left unpopulated");
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                    Err(e) => {
                        warn!(subject = %subject.description, error = %e, "subject population failed");
                    }
                }
            }
        }

        let snapshot = Snapshot {
            lists,
            subjects,
            default_action,
            default_method,
            semantic,
        };
        Ok((snapshot, fatal))
    }

    fn reconcile_existing(&self, snapshot: &Snapshot) -> usize {
        let mut state = self.state.lock();
        let outdated: Vec<ElementId> = state
            .filtered_entries()
            .filter(|(_, entry)| {
                let wanted = match &entry.cause {
                    FilterCause::Word { word, list } => snapshot.action_for_word(word, list),
                    FilterCause::Subject { description } => {
                        snapshot.action_for_subject(description)
                    }
                };
                wanted != Some(entry.action)
            })
            .map(|(el, _)| el)
            .collect();
        for el in &outdated {
            let _ = state.evict_processed(*el);
            let _ = self.unfilter_locked(&mut state, *el);
        }
        if !outdated.is_empty() {
            debug!(count = outdated.len(), "outdated filters removed");
        }
        outdated.len()
    }

    fn invalidate_if_changed(&self, snapshot: &Snapshot) {
        {
            let mut last = self.last_inputs.lock();
            if last.as_ref() == Some(snapshot) {
                return;
            }
            *last = Some(snapshot.clone());
        }
        let evicted = self.state.lock().evict_unfiltered();
        if evicted > 0 {
            debug!(count = evicted, "inputs changed, cached evaluations dropped");
        }
    }

    async fn evaluate(&self, el: ElementId, snapshot: &Snapshot, generation: u64) -> Evaluation {
        let text = self.site.text_of(self.dom.as_ref(), el);
        let hash = content_hash(&text);
        let mut unfiltered = false;
        {
            let mut state = self.state.lock();
            if state.is_ignored(el) {
                return Evaluation {
                    unfiltered,
                    outcome: Ok(Outcome::Ignored),
                };
            }
            match state.processed_hash(el) {
                Some(previous) if previous == hash => {
                    return Evaluation {
                        unfiltered,
                        outcome: Ok(Outcome::Unchanged),
                    };
                }
                Some(_) => {
                    let _ = state.evict_processed(el);
                    unfiltered = self.unfilter_locked(&mut state, el);
                }
                None => {}
            }
            state.mark_processed(el, hash, generation);
        }

        let outcome = self.decide(el, &text, snapshot, generation).await;
        Evaluation { unfiltered, outcome }
    }

    async fn decide(
        &self,
        el: ElementId,
        text: &str,
        snapshot: &Snapshot,
        generation: u64,
    ) -> Result<Outcome> {
        if let Some((list, word)) = FilterSets::find_match(&snapshot.lists, text) {
            let action = list.effective_action(snapshot.default_action);
            let cause = FilterCause::Word {
                word,
                list: list.list_name.clone(),
            };
            return self.apply(el, action, cause, generation);
        }

        let Some(classifier) = self.classifier.as_ref().filter(|_| snapshot.semantic) else {
            return Ok(Outcome::Clean);
        };
        let verdict = classifier
            .classify(text, &snapshot.subjects, snapshot.default_method)
            .await;
        match verdict {
            Ok(Some(index)) => {
                let subject = &snapshot.subjects[index];
                let action = subject.effective_action(snapshot.default_action);
                let cause = FilterCause::Subject {
                    description: subject.description.clone(),
                };
                self.apply(el, action, cause, generation)
            }
            Ok(None) => Ok(Outcome::Clean),
            Err(e) => {
                let _ = self.state.lock().evict_processed_from(el, generation);
                if is_fatal(&e) {
                    return Err(e.into());
                }
                warn!(element = %el, error = %e, "classification failed, leaving unfiltered");
                Ok(Outcome::MlError)
            }
        }
    }

    fn apply(
        &self,
        el: ElementId,
        action: FilterAction,
        cause: FilterCause,
        generation: u64,
    ) -> Result<Outcome> {
        let mut state = self.state.lock();
        if self.generation() != generation {
            let _ = state.evict_processed_from(el, generation);
            debug!(element = %el, generation, "stale verdict discarded");
            return Ok(Outcome::Stale);
        }
        if !self.dom.is_connected(el) {
            return Ok(Outcome::Clean);
        }
        let entry = effects::apply(self.dom.as_ref(), el, action, cause)?;
        self.stats.record_applied(&entry.cause);
        state.insert_filtered(el, entry);
        Ok(Outcome::Filtered)
    }

    fn unfilter_all(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.filtered_ids();
        for el in &removed {
            let _ = self.unfilter_locked(&mut state, *el);
        }
        state.clear_tracking();
        removed.len()
    }

    fn unfilter_locked(&self, state: &mut FilterState, el: ElementId) -> bool {
        let Some(entry) = state.remove_filtered(el) else {
            return false;
        };
        effects::revert(self.dom.as_ref(), el, &entry);
        self.stats.record_removed(&entry.cause);
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use veil_core::{EmbedType, InferenceSettings, LlmType};
    use veil_inference::mock::{MockCompletionProvider, MockEmbeddingProvider};
    use veil_inference::{
        BudgetGuard, CompletionProvider, EmbeddingProvider, InferenceSettingsProvider,
        ProviderFactory,
    };
    use veil_settings::ClassifierSettings;
    use veil_store::{CostLedgerStore, FilterListRepository, LedgerRepository, WordStatsRepository};

    use super::*;
    use crate::dom::MemoryDom;
    use crate::effects::APPLIED_ACTION_ATTR;
    use crate::site::SelectorSiteSupport;

    const HOST: &str = "news.example";

    struct Page {
        dom: Arc<MemoryDom>,
        gateway: StoreGateway,
        stats: Arc<StatsAggregator>,
        reconciler: Reconciler,
    }

    fn page_with(classifier: Option<Arc<SemanticClassifier>>, gateway: StoreGateway) -> Page {
        let dom = Arc::new(MemoryDom::new(HOST));
        let stats = Arc::new(StatsAggregator::new(&gateway));
        let site = Arc::new(SelectorSiteSupport::new().with_site(HOST, "article"));
        let reconciler = Reconciler::new(
            dom.clone(),
            site,
            &gateway,
            classifier,
            Arc::clone(&stats),
        );
        Page {
            dom,
            gateway,
            stats,
            reconciler,
        }
    }

    async fn page(words: &[&str]) -> Page {
        let gateway = StoreGateway::in_memory();
        let words: Vec<String> = words.iter().map(|w| (*w).to_string()).collect();
        let _ = FilterListRepository::new(gateway.clone())
            .create_list("news", &words)
            .await
            .unwrap();
        page_with(None, gateway)
    }

    impl Page {
        fn article(&self, text: &str) -> ElementId {
            self.dom.append_text(self.dom.root(), "article", text)
        }

        fn action(&self, el: ElementId) -> Option<String> {
            self.dom.attribute(el, APPLIED_ACTION_ATTR)
        }

        fn lists(&self) -> FilterListRepository {
            FilterListRepository::new(self.gateway.clone())
        }
    }

    // ── lexical ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn whole_word_match_is_blurred() {
        let page = page(&["trigger"]).await;
        let hit = page.article("this is a trigger word");
        let miss = page.article("bigger triggering concept");

        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.filtered, 1);
        assert_eq!(page.action(hit).as_deref(), Some("blur"));
        assert_eq!(page.action(miss), None);
        assert_eq!(
            page.reconciler.cause_of(hit),
            Some(FilterCause::Word {
                word: "trigger".into(),
                list: "news".into()
            })
        );
        assert_eq!(page.stats.pending("trigger"), 1);
    }

    #[tokio::test]
    async fn unchanged_content_is_skipped() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        let _ = page.reconciler.reconcile().await.unwrap();
        let second = page.reconciler.reconcile().await.unwrap();
        assert_eq!(second.skipped_unchanged, 1);
        assert_eq!(second.filtered, 0);
        assert!(page.reconciler.is_filtered(el));
        assert_eq!(page.stats.pending("trigger"), 1);
    }

    #[tokio::test]
    async fn changed_content_is_reevaluated() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        let _ = page.reconciler.reconcile().await.unwrap();
        page.dom.set_text(el, "now harmless");
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.unfiltered, 1);
        assert_eq!(page.action(el), None);
        assert_eq!(page.stats.pending("trigger"), 0);
    }

    #[tokio::test]
    async fn removed_word_unfilters_without_mutation() {
        let page = page(&["trigger", "other"]).await;
        let el = page.article("a trigger");
        let _ = page.reconciler.reconcile().await.unwrap();
        assert!(page.reconciler.is_filtered(el));

        let _ = page.lists().remove_word("news", "trigger").await.unwrap();
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.unfiltered, 1);
        assert!(!page.reconciler.is_filtered(el));
        assert_eq!(page.action(el), None);
    }

    #[tokio::test]
    async fn added_word_reaches_unchanged_content() {
        let page = page(&["other"]).await;
        let el = page.article("a trigger here");
        let first = page.reconciler.reconcile().await.unwrap();
        assert_eq!(first.filtered, 0);

        let _ = page.lists().add_word("news", "trigger").await.unwrap();
        let second = page.reconciler.reconcile().await.unwrap();
        assert_eq!(second.skipped_unchanged, 0);
        assert_eq!(second.filtered, 1);
        assert!(page.reconciler.is_filtered(el));

        let third = page.reconciler.reconcile().await.unwrap();
        assert_eq!(third.skipped_unchanged, 1);
        assert_eq!(page.stats.pending("trigger"), 1);
    }

    #[tokio::test]
    async fn input_change_leaves_ignored_elements_alone() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger here");
        let _ = page.reconciler.reconcile().await.unwrap();
        let _ = page.reconciler.unfilter_and_ignore(el);

        let _ = page.lists().add_word("news", "here").await.unwrap();
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.skipped_ignored, 1);
        assert!(!page.reconciler.is_filtered(el));
    }

    #[tokio::test]
    async fn list_action_change_reapplies() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        let _ = page.reconciler.reconcile().await.unwrap();
        page.lists()
            .set_list_action("news", Some(FilterAction::Hide))
            .await
            .unwrap();
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.unfiltered, 1);
        assert_eq!(report.filtered, 1);
        assert_eq!(page.action(el).as_deref(), Some("hide"));
    }

    #[tokio::test]
    async fn disabling_site_unfilters_everything() {
        let (logs, _guard) = veil_core::logging::capture_logs();
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        page.dom.set_attribute(el, "style", "margin: 0");
        let _ = page.reconciler.reconcile().await.unwrap();

        BlacklistRepository::new(page.gateway.clone())
            .disable_site(HOST)
            .await
            .unwrap();
        let report = page.reconciler.reconcile().await.unwrap();
        assert!(report.blacklisted);
        assert_eq!(report.unfiltered, 1);
        assert_eq!(page.action(el), None);
        assert_eq!(page.dom.attribute(el, "style").as_deref(), Some("margin: 0"));
        assert!(page.reconciler.filtered_elements().is_empty());
        assert!(logs.has_event(tracing::Level::INFO, "site disabled"));
        assert_eq!(logs.field("site disabled", "host").as_deref(), Some(HOST));
    }

    #[tokio::test]
    async fn ignore_and_reallow() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        let _ = page.reconciler.reconcile().await.unwrap();

        assert!(page.reconciler.unfilter_and_ignore(el));
        assert_eq!(page.action(el), None);
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.skipped_ignored, 1);
        assert!(!page.reconciler.is_filtered(el));

        assert!(page.reconciler.reallow(el));
        let _ = page.reconciler.reconcile().await.unwrap();
        assert!(page.reconciler.is_filtered(el));
    }

    #[tokio::test]
    async fn externally_marked_element_is_double_apply() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        page.dom.set_attribute(el, APPLIED_ACTION_ATTR, "blur");
        assert_matches!(
            page.reconciler.reconcile().await,
            Err(EngineError::AlreadyFiltered(id)) if id == el
        );
    }

    #[tokio::test]
    async fn detached_elements_are_pruned() {
        let page = page(&["trigger"]).await;
        let el = page.article("a trigger");
        let _ = page.reconciler.reconcile().await.unwrap();
        page.dom.detach(el);
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.pruned, 1);
        assert!(page.reconciler.filtered_elements().is_empty());
        assert_eq!(page.stats.pending("trigger"), 1);
        let _ = page.stats.flush().await.unwrap();
        assert_eq!(
            WordStatsRepository::new(page.gateway.clone())
                .count("trigger")
                .await
                .unwrap(),
            1
        );
    }

    // ── semantic ────────────────────────────────────────────────────

    const POLITICS: &str = "the senate passed the new budget bill late last night";
    const SPORTS: &str = "the home team won the championship game in overtime";

    struct Factory {
        embed: Arc<MockEmbeddingProvider>,
        llm: Option<Arc<MockCompletionProvider>>,
    }

    impl ProviderFactory for Factory {
        fn embedding_provider(
            &self,
            _: &InferenceSettings,
        ) -> veil_inference::Result<Option<Arc<dyn EmbeddingProvider>>> {
            Ok(Some(self.embed.clone() as Arc<dyn EmbeddingProvider>))
        }

        fn completion_provider(
            &self,
            _: &InferenceSettings,
        ) -> veil_inference::Result<Option<Arc<dyn CompletionProvider>>> {
            Ok(self.llm.clone().map(|l| l as Arc<dyn CompletionProvider>))
        }
    }

    async fn semantic_page(llm: Option<Arc<MockCompletionProvider>>) -> (Page, Arc<LedgerRepository>) {
        let gateway = StoreGateway::in_memory();
        let embed = Arc::new(MockEmbeddingProvider::new(2));
        embed.pin("politics", vec![1.0, 0.0]);
        embed.pin(POLITICS, vec![0.9, 0.1]);
        embed.pin(SPORTS, vec![0.0, 1.0]);

        let settings = InferenceSettings {
            embed_type: EmbedType::Openai,
            llm_type: if llm.is_some() { LlmType::Openai } else { LlmType::None },
            ..InferenceSettings::default()
        };
        let ledger = Arc::new(LedgerRepository::new(gateway.clone()));
        let classifier = SemanticClassifier::new(
            ClassifierSettings::default(),
            Arc::new(settings) as Arc<dyn InferenceSettingsProvider>,
            Arc::new(Factory { embed, llm }),
            BudgetGuard::new(ledger.clone()),
        );
        let subjects = SubjectRepository::new(gateway.clone());
        let _ = subjects.add_subject("politics").await.unwrap();
        let _ = subjects
            .update_keywords("politics", vec!["politics".into()])
            .await
            .unwrap();
        (page_with(Some(Arc::new(classifier)), gateway), ledger)
    }

    #[tokio::test]
    async fn similar_text_is_filtered_by_subject() {
        let (page, _) = semantic_page(None).await;
        let politics = page.article(POLITICS);
        let sports = page.article(SPORTS);

        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.filtered, 1);
        assert_eq!(
            page.reconciler.cause_of(politics),
            Some(FilterCause::Subject {
                description: "politics".into()
            })
        );
        assert!(!page.reconciler.is_filtered(sports));
        assert_eq!(page.dom.tooltip(politics).unwrap().text, "Filtered subject \"politics\"");

        let stored = SubjectRepository::new(page.gateway.clone())
            .get_subject("politics")
            .await
            .unwrap();
        assert!(stored.is_populated());
    }

    #[tokio::test]
    async fn lexical_match_skips_classifier() {
        let (page, _) = semantic_page(Some(Arc::new(MockCompletionProvider::always(
            "{\"results\": [\"YES\"]}",
        ))))
        .await;
        let _ = page
            .lists()
            .create_list("words", &["senate".to_string()])
            .await
            .unwrap();
        let el = page.article(POLITICS);
        let _ = page.reconciler.reconcile().await.unwrap();
        assert_matches!(page.reconciler.cause_of(el), Some(FilterCause::Word { .. }));
    }

    #[tokio::test]
    async fn disabling_ml_unfilters_subject_matches() {
        let (page, _) = semantic_page(None).await;
        let el = page.article(POLITICS);
        let _ = page.reconciler.reconcile().await.unwrap();
        assert!(page.reconciler.is_filtered(el));

        PreferencesRepository::new(page.gateway.clone())
            .set_ml_enabled(false)
            .await
            .unwrap();
        let report = page.reconciler.reconcile().await.unwrap();
        assert_eq!(report.unfiltered, 1);
        assert!(!page.reconciler.is_filtered(el));
    }

    #[tokio::test]
    async fn deleted_subject_unfilters() {
        let (page, _) = semantic_page(None).await;
        let el = page.article(POLITICS);
        let _ = page.reconciler.reconcile().await.unwrap();
        SubjectRepository::new(page.gateway.clone())
            .delete_subject("politics")
            .await
            .unwrap();
        let _ = page.reconciler.reconcile().await.unwrap();
        assert!(!page.reconciler.is_filtered(el));
    }

    #[tokio::test]
    async fn failed_population_keeps_existing_subject_filters() {
        let llm = Arc::new(MockCompletionProvider::always("{\"results\": [\"YES\"]}"));
        let (page, ledger) = semantic_page(Some(llm)).await;
        let politics = page.article(POLITICS);
        let _ = page.reconciler.reconcile().await.unwrap();
        assert!(page.reconciler.is_filtered(politics));

        ledger.set_budget_limit(Some(0.01)).await.unwrap();
        let _ = ledger.add(0.02).await.unwrap();
        let _ = SubjectRepository::new(page.gateway.clone())
            .add_subject("sports")
            .await
            .unwrap();
        let result = page.reconciler.reconcile().await;
        assert_matches!(result, Err(ref e) if e.is_budget_exceeded());
        assert!(page.reconciler.is_filtered(politics));
    }

    #[tokio::test]
    async fn populated_subjects_are_saved_when_another_fails() {
        let llm = Arc::new(MockCompletionProvider::always("{\"results\": [\"YES\"]}"));
        let (page, ledger) = semantic_page(Some(llm.clone())).await;
        ledger.set_budget_limit(Some(0.01)).await.unwrap();
        let _ = ledger.add(0.02).await.unwrap();
        let repo = SubjectRepository::new(page.gateway.clone());
        let _ = repo.add_subject("sports").await.unwrap();

        let result = page.reconciler.reconcile().await;
        assert_matches!(result, Err(ref e) if e.is_budget_exceeded());
        assert!(repo.get_subject("politics").await.unwrap().is_populated());
        assert!(!repo.get_subject("sports").await.unwrap().is_populated());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn budget_exceeded_surfaces_after_lexical_work() {
        let llm = Arc::new(MockCompletionProvider::always("{\"results\": [\"YES\"]}"));
        let (page, ledger) = semantic_page(Some(llm.clone())).await;
        let _ = page
            .lists()
            .create_list("words", &["overtime".to_string()])
            .await
            .unwrap();
        ledger.set_budget_limit(Some(0.01)).await.unwrap();
        let _ = ledger.add(0.02).await.unwrap();

        let politics = page.article(POLITICS);
        let sports = page.article(SPORTS);
        let result = page.reconciler.reconcile().await;
        assert_matches!(result, Err(ref e) if e.is_budget_exceeded());
        assert_eq!(llm.call_count(), 0);
        assert!(page.reconciler.is_filtered(sports));
        assert!(!page.reconciler.is_filtered(politics));
    }
}
