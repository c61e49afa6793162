//! Match scoring and ranked element search
//!
//! Scoring is a weighted mean over the dimensions the criteria actually asks
//! about. Text and alias answer the same question ("is this what the caller
//! called it?") and form one identity group weighted `text + alias`, scored by
//! the better of the two. A dimension the criteria does not mention is left
//! out of both the numerator and the denominator.

use crate::config::SearchConfig;
use crate::criteria::SearchCriteria;
use crate::element::{AIElementRecord, ElementRect};
use crate::events::{self, BridgeEvent, EventBus};
use crate::index::{ElementIndex, Snapshot};
use crate::similarity::{self, MatchKind, Similarity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Per-dimension sub-scores. `None` means the dimension was not requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub element: AIElementRecord,
    pub confidence: f64,
    pub match_reasons: Vec<String>,
    #[serde(default)]
    pub scores: SearchScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<MatchResult>,
    pub best_match: Option<MatchResult>,
    pub scanned_count: usize,
    pub duration_ms: f64,
    pub criteria: SearchCriteria,
    /// The confidence `best_match` had to reach.
    pub threshold: f64,
    pub timestamp: i64,
}

impl SearchResponse {
    /// Highest-ranked result whether or not it cleared the threshold.
    pub fn nearest(&self) -> Option<&MatchResult> {
        self.results.first()
    }
}

/// Reference boxes resolved once per search.
#[derive(Debug, Default)]
struct ScoringContext {
    near: Option<(String, ElementRect)>,
    within: Option<(String, ElementRect)>,
}

/// Scores one element against one criteria object.
pub struct MatchScorer<'a> {
    config: &'a SearchConfig,
    criteria: &'a SearchCriteria,
    fuzzy: bool,
    fuzzy_threshold: f64,
    id_pattern: Option<Regex>,
    context: ScoringContext,
}

impl<'a> MatchScorer<'a> {
    /// Prepare a scorer for `criteria` over the given snapshot. Returns `None`
    /// when the criteria cannot match anything in it (nothing to discriminate
    /// on, or a `within` container that does not exist).
    pub fn prepare(
        config: &'a SearchConfig,
        criteria: &'a SearchCriteria,
        elements: &[AIElementRecord],
    ) -> Option<Self> {
        if !criteria.is_discriminating() {
            debug!("Criteria has no discriminating field; nothing can match");
            return None;
        }

        let mut context = ScoringContext::default();
        if let Some(near_id) = &criteria.near {
            match elements.iter().find(|e| &e.id == near_id) {
                Some(reference) => context.near = Some((near_id.clone(), reference.state.rect)),
                None => warn!(near = %near_id, "Reference element for 'near' not in index; ignoring"),
            }
        }
        if let Some(within_id) = &criteria.within {
            match elements.iter().find(|e| &e.id == within_id) {
                Some(container) => {
                    context.within = Some((within_id.clone(), container.state.rect))
                }
                None => {
                    debug!(within = %within_id, "Container for 'within' not in index");
                    return None;
                }
            }
        }

        let id_pattern = match criteria.id_pattern.as_deref() {
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern, error = %e, "idPattern is not a valid regex; nothing can match");
                    return None;
                }
            },
            None => None,
        };

        let fuzzy_threshold = criteria
            .fuzzy_threshold
            .unwrap_or(config.fuzzy_threshold);
        if !(0.0..=1.0).contains(&fuzzy_threshold) {
            warn!(fuzzy_threshold, "fuzzyThreshold outside [0, 1]; clamping");
        }

        Some(Self {
            config,
            criteria,
            fuzzy: criteria.fuzzy.unwrap_or(config.fuzzy_by_default),
            fuzzy_threshold: fuzzy_threshold.clamp(0.0, 1.0),
            id_pattern,
            context,
        })
    }

    fn floor(&self, score: f64) -> f64 {
        if score < self.config.relevance_floor {
            0.0
        } else {
            score.min(1.0)
        }
    }

    fn similar(&self, query: &str, candidate: &str) -> Option<Similarity> {
        similarity::similarity(query, candidate, self.fuzzy, self.fuzzy_threshold)
    }

    /// Best similarity of `query` over `candidates`; the first one wins ties.
    fn best_of<'c>(
        &self,
        query: &str,
        candidates: impl IntoIterator<Item = &'c str>,
    ) -> Option<(Similarity, &'c str)> {
        let mut best: Option<(Similarity, &'c str)> = None;
        for candidate in candidates {
            if let Some(sim) = self.similar(query, candidate) {
                let better = match &best {
                    Some((current, _)) => sim.score > current.score,
                    None => true,
                };
                if better {
                    best = Some((sim, candidate));
                }
            }
        }
        best
    }

    pub fn score(&self, element: &AIElementRecord) -> MatchResult {
        let criteria = self.criteria;
        let weights = &self.config.weights;
        let mut reasons = Vec::new();
        let mut scores = SearchScores::default();

        let outside = self.context.within.as_ref().is_some_and(|(id, rect)| {
            element.id == *id || !rect.contains(&element.state.rect)
        });
        let is_reference = self
            .context
            .near
            .as_ref()
            .is_some_and(|(id, _)| element.id == *id);
        if outside || is_reference {
            return MatchResult {
                element: element.clone(),
                confidence: 0.0,
                match_reasons: reasons,
                scores,
            };
        }

        // text
        let wants_identity = criteria.text.is_some()
            || criteria.text_contains.is_some()
            || criteria.placeholder.is_some()
            || criteria.title.is_some();
        let mut text_score = 0.0;
        if let Some(query) = &criteria.text {
            if let Some((sim, candidate)) = self.best_of(query, element.label_candidates()) {
                let s = self.floor(sim.score);
                if s > 0.0 {
                    text_score = s;
                    reasons.push(text_reason("text", sim.kind, candidate, s));
                }
            }
        }
        if let Some(needle) = &criteria.text_contains {
            if let Some(candidate) = element
                .label_candidates()
                .find(|c| similarity::contains_ignore_case(c, needle))
            {
                text_score = 1.0;
                reasons.push(format!("text contains: '{needle}' in '{candidate}'"));
            }
        }
        if let (Some(query), Some(placeholder)) = (&criteria.placeholder, &element.placeholder) {
            if let Some(sim) = self.similar(query, placeholder) {
                let s = self.floor(sim.score);
                if s > 0.0 {
                    text_score = f64::max(text_score, s);
                    reasons.push(text_reason("placeholder", sim.kind, placeholder, s));
                }
            }
        }
        if let (Some(query), Some(title)) = (&criteria.title, &element.title) {
            if let Some(sim) = self.similar(query, title) {
                let s = self.floor(sim.score);
                if s > 0.0 {
                    text_score = f64::max(text_score, s);
                    reasons.push(text_reason("title", sim.kind, title, s));
                }
            }
        }
        if wants_identity {
            scores.text = Some(text_score);
        }

        // accessibility
        let mut accessibility_score = 0.0;
        if let Some(query) = &criteria.accessible_name {
            if let Some(name) = &element.accessible_name {
                if let Some(sim) = self.similar(query, name) {
                    accessibility_score = self.floor(sim.score);
                    if accessibility_score > 0.0 {
                        reasons.push(text_reason(
                            "accessible name",
                            sim.kind,
                            name,
                            accessibility_score,
                        ));
                    }
                }
            }
            scores.accessibility = Some(accessibility_score);
        }

        // role
        let mut role_score = 0.0;
        let mut checks = 0u32;
        let mut hits = 0u32;
        if let Some(role) = &criteria.role {
            checks += 1;
            let hit = element
                .role
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(role))
                || element.tag_name.eq_ignore_ascii_case(role);
            if hit {
                hits += 1;
                reasons.push(format!("role match: {}", role.to_lowercase()));
            }
        }
        if let Some(element_type) = &criteria.element_type {
            checks += 1;
            let hit = element.element_type.eq_ignore_ascii_case(element_type)
                || element
                    .semantic_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(element_type));
            if hit {
                hits += 1;
                reasons.push(format!("type match: {}", element_type.to_lowercase()));
            }
        }
        if let Some(pattern) = &self.id_pattern {
            checks += 1;
            if pattern.is_match(&element.id) {
                hits += 1;
                reasons.push(format!("id matches /{}/", pattern.as_str()));
            }
        }
        if checks > 0 {
            role_score = f64::from(hits) / f64::from(checks);
            scores.role = Some(role_score);
        }

        // spatial
        let mut spatial_score = 0.0;
        if let Some((near_id, reference)) = &self.context.near {
            let distance = reference.distance_to(&element.state.rect);
            spatial_score = self.floor((1.0 - distance / self.config.spatial_radius).max(0.0));
            if spatial_score > 0.0 {
                reasons.push(format!("near #{near_id}: {distance:.0}px"));
            }
            scores.spatial = Some(spatial_score);
        }

        // alias
        let mut alias_score = 0.0;
        if let Some(query) = &criteria.text {
            let aliases = element.aliases.iter().map(String::as_str);
            if let Some((sim, alias)) = self.best_of(query, aliases) {
                alias_score = self.floor(sim.score);
                if alias_score > 0.0 {
                    reasons.push(text_reason("alias", sim.kind, alias, alias_score));
                }
            }
            if let Some(sim) = self.similar(query, &element.description) {
                let s = self.floor(sim.score);
                if s > alias_score {
                    alias_score = s;
                    reasons.push(text_reason("description", sim.kind, &element.description, s));
                }
            }
            scores.alias = Some(alias_score);
        }

        let mut weighted = 0.0;
        let mut total = 0.0;
        if wants_identity {
            let w = weights.text_weight + weights.alias_weight;
            weighted += w * f64::max(text_score, alias_score);
            total += w;
        }
        if criteria.accessible_name.is_some() {
            weighted += weights.accessibility_weight * accessibility_score;
            total += weights.accessibility_weight;
        }
        if checks > 0 {
            weighted += weights.role_weight * role_score;
            total += weights.role_weight;
        }
        if self.context.near.is_some() {
            weighted += weights.spatial_weight * spatial_score;
            total += weights.spatial_weight;
        }

        let confidence = if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        MatchResult {
            element: element.clone(),
            confidence,
            match_reasons: reasons,
            scores,
        }
    }
}

fn text_reason(dimension: &str, kind: MatchKind, candidate: &str, score: f64) -> String {
    match kind {
        MatchKind::Exact => format!("{dimension} match: '{candidate}'"),
        _ => format!("{dimension} {}: '{candidate}' ({score:.2})", kind.label()),
    }
}

/// Rank every element of `elements` against `criteria`.
///
/// Pure function of its inputs: the same snapshot and criteria always give the
/// same results in the same order. Zero-confidence elements are dropped; ties
/// keep index order.
pub fn rank(
    config: &SearchConfig,
    elements: &[AIElementRecord],
    criteria: &SearchCriteria,
    threshold: f64,
) -> SearchResponse {
    let started = Instant::now();
    let mut ranked: Vec<(usize, MatchResult)> = match MatchScorer::prepare(config, criteria, elements)
    {
        Some(scorer) => elements
            .iter()
            .enumerate()
            .map(|(i, element)| (i, scorer.score(element)))
            .filter(|(_, result)| result.confidence > 0.0)
            .collect(),
        None => Vec::new(),
    };
    ranked.sort_by(|(ia, a), (ib, b)| b.confidence.total_cmp(&a.confidence).then(ia.cmp(ib)));

    let results: Vec<MatchResult> = ranked.into_iter().map(|(_, r)| r).collect();
    let best_match = results
        .first()
        .filter(|r| r.confidence >= threshold)
        .cloned();

    SearchResponse {
        results,
        best_match,
        scanned_count: elements.len(),
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        criteria: criteria.clone(),
        threshold,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

/// Ranked search over an [`ElementIndex`].
#[derive(Debug, Clone)]
pub struct SearchEngine {
    index: Arc<ElementIndex>,
    config: SearchConfig,
    events: Option<Arc<EventBus>>,
}

impl SearchEngine {
    /// A search engine with its own private index.
    pub fn new(config: SearchConfig) -> Self {
        Self::with_index(Arc::new(ElementIndex::new()), config)
    }

    /// A search engine reading a shared index.
    pub fn with_index(index: Arc<ElementIndex>, config: SearchConfig) -> Self {
        Self {
            index,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<ElementIndex> {
        &self.index
    }

    pub fn snapshot(&self) -> Snapshot {
        self.index.snapshot()
    }

    /// Replace the indexed elements in one step.
    pub fn update_elements<E: Into<AIElementRecord>>(&self, elements: Vec<E>) {
        let elements: Vec<AIElementRecord> = elements.into_iter().map(Into::into).collect();
        let count = elements.len();
        self.index.replace(elements);
        events::emit(&self.events, || BridgeEvent::ElementsUpdated { count });
    }

    /// Search using the configured `min_confidence` for `best_match`.
    pub fn search(&self, criteria: &SearchCriteria) -> SearchResponse {
        self.search_with_threshold(criteria, self.config.min_confidence)
    }

    pub fn search_with_threshold(&self, criteria: &SearchCriteria, threshold: f64) -> SearchResponse {
        self.search_in(&self.index.snapshot(), criteria, threshold)
    }

    /// Search a snapshot the caller already holds, so follow-up work (error
    /// context, assertions) sees exactly the elements that were ranked.
    #[instrument(level = "debug", skip(self, snapshot, criteria), fields(criteria = %criteria.describe()))]
    pub fn search_in(
        &self,
        snapshot: &[AIElementRecord],
        criteria: &SearchCriteria,
        threshold: f64,
    ) -> SearchResponse {
        let response = rank(&self.config, snapshot, criteria, threshold);
        debug!(
            results = response.results.len(),
            best = ?response.best_match.as_ref().map(|m| (&m.element.id, m.confidence)),
            "Search finished"
        );
        events::emit(&self.events, || BridgeEvent::SearchCompleted {
            criteria: criteria.describe(),
            result_count: response.results.len(),
            best_confidence: response.best_match.as_ref().map(|m| m.confidence),
        });
        response
    }

    pub fn find_best(&self, criteria: &SearchCriteria) -> Option<MatchResult> {
        self.search(criteria).best_match
    }

    /// Best element for a free-text description, fuzzy by default.
    pub fn find(&self, description: &str) -> Option<AIElementRecord> {
        self.find_best(&SearchCriteria::fuzzy_text(description))
            .map(|m| m.element)
    }

    /// All elements with the given role, optionally narrowed by accessible name.
    pub fn find_by_role(&self, role: &str, name: Option<&str>) -> Vec<MatchResult> {
        let mut criteria = SearchCriteria::role(role);
        criteria.accessible_name = name.map(str::to_string);
        self.search(&criteria).results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementRecord, ElementState};

    fn element(id: &str, role: &str, text: &str, rect: ElementRect) -> AIElementRecord {
        ElementRecord {
            id: id.to_string(),
            element_type: role.to_string(),
            label: None,
            tag_name: role.to_string(),
            role: Some(role.to_string()),
            accessible_name: None,
            actions: vec!["click".to_string()],
            state: ElementState {
                visible: true,
                enabled: true,
                rect,
                text_content: Some(text.to_string()),
                ..Default::default()
            },
            registered: true,
        }
        .into()
    }

    fn rect(x: f64, y: f64) -> ElementRect {
        ElementRect::new(x, y, 80.0, 30.0)
    }

    fn engine(elements: Vec<AIElementRecord>) -> SearchEngine {
        let engine = SearchEngine::new(SearchConfig::default());
        engine.update_elements(elements);
        engine
    }

    #[test]
    fn test_scorer_rates_single_element() {
        let config = SearchConfig::default();
        let elements = vec![element("save", "button", "Save", rect(0.0, 0.0))];
        let criteria = SearchCriteria::text("Save").with_role("button");
        let scorer = MatchScorer::prepare(&config, &criteria, &elements).unwrap();

        let result = scorer.score(&elements[0]);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.scores.role, Some(1.0));

        let empty = SearchCriteria::default();
        assert!(MatchScorer::prepare(&config, &empty, &elements).is_none());
    }

    #[test]
    fn test_id_pattern_and_title() {
        let mut save = element("toolbar-save", "button", "", rect(0.0, 0.0));
        save.title = Some("Save document".to_string());
        let engine = engine(vec![
            element("menu-save", "button", "Save", rect(0.0, 40.0)),
            save,
        ]);

        let response = engine.search(&SearchCriteria::default().with_id_pattern("^toolbar-"));
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].element.id, "toolbar-save");
        assert_eq!(response.results[0].match_reasons, vec!["id matches /^toolbar-/"]);

        let best = engine
            .find_best(&SearchCriteria::default().with_title("Save document"))
            .unwrap();
        assert_eq!(best.element.id, "toolbar-save");
        assert!(best.match_reasons[0].starts_with("title match"));

        let broken = engine.search(&SearchCriteria::default().with_id_pattern("(unclosed"));
        assert!(broken.results.is_empty());
    }

    #[test]
    fn test_exact_text_match() {
        let engine = engine(vec![
            element("cancel", "button", "Cancel", rect(0.0, 0.0)),
            element("start", "button", "Start Extraction", rect(100.0, 0.0)),
        ]);
        let response = engine.search(&SearchCriteria::fuzzy_text("Start Extraction"));
        let best = response.best_match.unwrap();
        assert_eq!(best.element.id, "start");
        assert!(best.confidence > 0.8);
        assert_eq!(best.match_reasons[0], "text match: 'Start Extraction'");
    }

    #[test]
    fn test_typo_with_lowered_fuzzy_threshold() {
        let engine = engine(vec![
            element("reset", "button", "Reset", rect(0.0, 0.0)),
            element("submit", "button", "Submit", rect(100.0, 0.0)),
        ]);
        let criteria = SearchCriteria::text("Sbumit").with_fuzzy_threshold(0.6);
        let best = engine.search(&criteria).best_match.unwrap();
        assert_eq!(best.element.id, "submit");
        assert!(best.confidence >= 0.6);
    }

    #[test]
    fn test_empty_index_and_empty_criteria() {
        let empty = engine(vec![]);
        let response = empty.search(&SearchCriteria::text("anything"));
        assert!(response.results.is_empty());
        assert!(response.best_match.is_none());

        let populated = engine(vec![element("a", "button", "A", rect(0.0, 0.0))]);
        let response = populated.search(&SearchCriteria::default());
        assert!(response.results.is_empty());
        assert_eq!(response.scanned_count, 1);
    }

    #[test]
    fn test_role_only_ranks_by_index_order() {
        let engine = engine(vec![
            element("link", "link", "Docs", rect(0.0, 0.0)),
            element("b1", "button", "One", rect(0.0, 0.0)),
            element("b2", "button", "Two", rect(0.0, 0.0)),
        ]);
        let results = engine.find_by_role("button", None);
        let ids: Vec<&str> = results.iter().map(|r| r.element.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
        assert_eq!(results[0].match_reasons, vec!["role match: button"]);
    }

    #[test]
    fn test_role_mismatch_lowers_confidence() {
        let engine = engine(vec![
            element("save-link", "link", "Save", rect(0.0, 0.0)),
            element("save-btn", "button", "Save", rect(0.0, 0.0)),
        ]);
        let response = engine.search(&SearchCriteria::text("Save").with_role("button"));
        assert_eq!(response.results[0].element.id, "save-btn");
        assert_eq!(response.results[0].confidence, 1.0);
        assert!(response.results[1].confidence < 1.0);
    }

    #[test]
    fn test_alias_match_reason_comes_last() {
        let mut url = element("url", "input", "", rect(0.0, 0.0));
        url.aliases = vec!["URL input".to_string(), "address bar".to_string()];
        let engine = engine(vec![url]);
        let best = engine
            .search(&SearchCriteria::fuzzy_text("URL input").with_type("input"))
            .best_match
            .unwrap();
        assert_eq!(best.confidence, 1.0);
        assert_eq!(
            best.match_reasons,
            vec!["type match: input", "alias match: 'URL input'"]
        );
    }

    #[test]
    fn test_near_prefers_closer_elements() {
        let engine = engine(vec![
            element("label", "label", "Email", rect(0.0, 0.0)),
            element("far", "input", "", rect(400.0, 300.0)),
            element("close", "input", "", rect(0.0, 40.0)),
        ]);
        let response = engine.search(&SearchCriteria::role("input").near("label"));
        let ids: Vec<&str> = response.results.iter().map(|r| r.element.id.as_str()).collect();
        assert_eq!(ids, vec!["close", "far"]);
        assert!(response.results[0].match_reasons[1].starts_with("near #label"));
    }

    #[test]
    fn test_within_filters_outside_elements() {
        let mut form = element("form", "form", "", ElementRect::new(0.0, 0.0, 300.0, 300.0));
        form.record.state.text_content = None;
        let engine = engine(vec![
            form,
            element("inside", "button", "OK", rect(10.0, 10.0)),
            element("outside", "button", "OK", rect(500.0, 10.0)),
        ]);
        let response = engine.search(&SearchCriteria::text("OK").within("form"));
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].element.id, "inside");

        let missing = engine.search(&SearchCriteria::text("OK").within("nope"));
        assert!(missing.results.is_empty());
    }

    #[test]
    fn test_best_match_is_threshold_gated() {
        let engine = engine(vec![element("submit", "button", "Submit", rect(0.0, 0.0))]);
        let criteria = SearchCriteria::text("Sbumit").with_fuzzy_threshold(0.6);
        let gated = engine.search_with_threshold(&criteria, 0.9);
        assert!(gated.best_match.is_none());
        assert_eq!(gated.nearest().unwrap().element.id, "submit");
    }

    #[test]
    fn test_text_contains() {
        let engine = engine(vec![
            element("greeting", "text", "Welcome back, Ada", rect(0.0, 0.0)),
            element("other", "text", "Goodbye", rect(0.0, 0.0)),
        ]);
        let response = engine.search(&SearchCriteria {
            text_contains: Some("back".to_string()),
            ..Default::default()
        });
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].confidence, 1.0);
    }
}
