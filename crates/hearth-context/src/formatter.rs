//! Prompt formatter (C13, `spec.md §4.9`): renders the primary/related split
//! into the prompt context string the downstream LLM actually reads.

use crate::reranker::LiveStateLookup;
use crate::types::{Candidate, ConversationContext, FormatterStrategy, RankedContext};
use hearth_core::EntityState;
use hearth_rag::GraphStore;
use std::collections::BTreeSet;
use std::fmt::Write as _;

const PERSONA_LINE: &str = "Az alábbi releváns eszközök és aktuális állapotaik állnak rendelkezésre:";
const COMPACT_TOTAL_THRESHOLD: usize = 8;
const TLDR_AREA_THRESHOLD: usize = 2;
const TLDR_OVERVIEW_TOTAL_THRESHOLD: usize = 6;

/// Maps a device class to the descriptive Hungarian noun used in rendered names.
fn device_class_noun(device_class: &str) -> Option<&'static str> {
    match device_class {
        "temperature" => Some("hőmérséklet"),
        "humidity" => Some("páratartalom"),
        "pressure" => Some("légnyomás"),
        "power" => Some("teljesítmény"),
        _ => None,
    }
}

/// Best-effort area/room hint pulled from an `entity_id` like `sensor.kert_humidity`.
fn location_hint(entity: &hearth_core::Entity) -> String {
    if let Some(area) = &entity.area {
        return area.clone();
    }
    entity
        .entity_id
        .split('.')
        .nth(1)
        .and_then(|slug| slug.split('_').next())
        .unwrap_or("")
        .to_string()
}

/// `clean_name(entity)`: prefers the stored friendly name, else synthesizes a
/// Hungarian descriptive name for the generic device classes the source data
/// tends to leave unnamed.
#[must_use]
pub fn clean_name(entity: &hearth_core::Entity) -> String {
    if let Some(name) = entity.friendly_name.as_deref().filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match entity.device_class.as_deref().and_then(device_class_noun) {
        Some(noun) => {
            let hint = location_hint(entity);
            if hint.is_empty() {
                noun.to_string()
            } else {
                format!("{hint} {noun}")
            }
        }
        None => entity.entity_id.clone(),
    }
}

fn format_value(state: Option<&EntityState>) -> String {
    match state {
        Some(state) => match &state.unit {
            Some(unit) => format!("{}{}", state.state, unit),
            None => state.state.clone(),
        },
        None => "ismeretlen".to_string(),
    }
}

fn area_label(display_name: Option<&str>, aliases: &[String], area_id: &str) -> String {
    let name = display_name.unwrap_or(area_id);
    if aliases.is_empty() {
        name.to_string()
    } else {
        format!("{name} ({})", aliases.join(", "))
    }
}

/// Renders the reranked candidate set into a prompt-ready string, choosing a
/// formatting strategy and attaching manual hints where available.
pub struct PromptFormatter<S: LiveStateLookup, G: GraphStore> {
    live_state: S,
    graph: G,
}

impl<S: LiveStateLookup, G: GraphStore> PromptFormatter<S, G> {
    /// Build a formatter from its live-state and graph dependencies.
    #[must_use]
    pub const fn new(live_state: S, graph: G) -> Self {
        Self { live_state, graph }
    }

    /// Choose the formatting strategy, honoring a scope-detector override first.
    #[must_use]
    pub fn select_strategy(
        scope: hearth_core::Scope,
        primary: &[Candidate],
        related: &[Candidate],
        context: &ConversationContext,
        preferred: Option<FormatterStrategy>,
    ) -> FormatterStrategy {
        if let Some(forced) = preferred {
            return forced;
        }
        let total = primary.len() + related.len();
        let has_memory_context = primary.iter().chain(related.iter()).any(|c| c.memory_boosted || c.synthetic_from_memory);
        if context.is_follow_up && has_memory_context {
            return FormatterStrategy::Hierarchical;
        }
        if total > COMPACT_TOTAL_THRESHOLD || scope == hearth_core::Scope::Micro {
            return FormatterStrategy::Compact;
        }
        let areas = context.areas_mentioned.len();
        if areas >= TLDR_AREA_THRESHOLD || (scope == hearth_core::Scope::Overview && total > TLDR_OVERVIEW_TOTAL_THRESHOLD) {
            return FormatterStrategy::Tldr;
        }
        if areas == 1 {
            return FormatterStrategy::GroupedByArea;
        }
        FormatterStrategy::Detailed
    }

    /// Resolve the current value for `candidate`: a fresh live-state read for
    /// primary candidates, the already-known (possibly stale) state otherwise.
    async fn value_for(&self, candidate: &Candidate, fresh: bool) -> String {
        if fresh {
            let resolved = self.live_state.resolve(&candidate.entity.entity_id).await;
            format_value(resolved.as_ref().or(candidate.entity.state.as_ref()))
        } else {
            format_value(candidate.entity.state.as_ref())
        }
    }

    async fn area_tag(&self, candidate: &Candidate) -> String {
        match &candidate.entity.area {
            Some(area_id) => match self.graph.area(area_id).await.ok().flatten() {
                Some(area) => area_label(Some(&area.name), &area.aliases, area_id),
                None => area_id.clone(),
            },
            None => "ismeretlen terület".to_string(),
        }
    }

    async fn line(&self, candidate: &Candidate, fresh: bool, tag: Option<&str>) -> String {
        let name = clean_name(&candidate.entity);
        let area = self.area_tag(candidate).await;
        let value = self.value_for(candidate, fresh).await;
        match tag {
            Some(tag) => format!("{name} [{area}] {tag}: {value}"),
            None => format!("{name} [{area}]: {value}"),
        }
    }

    async fn manual_hint(&self, primary: &[Candidate]) -> Option<String> {
        let top = primary.first()?;
        let device_id = top.entity.device_id.as_ref()?;
        let document = self.graph.document_for_device(device_id).await.ok().flatten()?;
        Some(format!("Kézikönyv: {}", document.text))
    }

    /// Render `primary`/`related` using the selected strategy, attaching manual
    /// hints where the top primary entity has a linked device manual.
    pub async fn format(
        &self,
        primary: Vec<Candidate>,
        related: Vec<Candidate>,
        scope: hearth_core::Scope,
        context: &ConversationContext,
        preferred: Option<FormatterStrategy>,
    ) -> RankedContext {
        let strategy = Self::select_strategy(scope, &primary, &related, context, preferred);
        let mut out = String::new();
        out.push_str(PERSONA_LINE);
        out.push('\n');

        match strategy {
            FormatterStrategy::Compact => self.render_compact(&mut out, &primary, &related).await,
            FormatterStrategy::GroupedByArea => self.render_grouped_by_area(&mut out, &primary, &related).await,
            FormatterStrategy::Tldr => self.render_tldr(&mut out, &primary, &related).await,
            FormatterStrategy::Hierarchical => self.render_hierarchical(&mut out, &primary, &related).await,
            FormatterStrategy::Detailed => self.render_detailed(&mut out, &primary, &related, context).await,
        }

        if let Some(hint) = self.manual_hint(&primary).await {
            out.push('\n');
            out.push_str(&hint);
        }

        // `original_source/app/main.py:577-578`: every formatted context ends with
        // a `Relevant entities:`/`Relevant domains:` footer. `ConversationAnalyzer`
        // scans system turns for exactly this marker to recover `previous_entities`
        // on a follow-up turn, so the two must stay in lockstep.
        let ids: Vec<&str> = primary.iter().chain(related.iter()).map(|c| c.entity.entity_id.as_str()).collect();
        let domains: BTreeSet<&str> = primary.iter().chain(related.iter()).map(|c| c.entity.domain.as_str()).collect();
        let _ = write!(
            out,
            "\nRelevant entities: {}\nRelevant domains: {}",
            ids.join(","),
            domains.into_iter().collect::<Vec<_>>().join(",")
        );

        RankedContext { primary, related, formatter_type: strategy, formatted_context: out }
    }

    async fn render_compact(&self, out: &mut String, primary: &[Candidate], related: &[Candidate]) {
        let mut parts = Vec::new();
        for candidate in primary.iter().chain(related.iter()) {
            parts.push(self.line(candidate, candidate_is_primary(primary, candidate), None).await);
        }
        out.push_str(&parts.join(" | "));
    }

    async fn render_grouped_by_area(&self, out: &mut String, primary: &[Candidate], related: &[Candidate]) {
        let mut areas: Vec<String> = Vec::new();
        for candidate in primary.iter().chain(related.iter()) {
            let area = self.area_tag(candidate).await;
            if !areas.contains(&area) {
                areas.push(area);
            }
        }
        for area in areas {
            let _ = writeln!(out, "## {area}");
            for candidate in primary {
                if self.area_tag(candidate).await == area {
                    let _ = writeln!(out, "[P] {}", self.line(candidate, true, None).await);
                }
            }
            for candidate in related {
                if self.area_tag(candidate).await == area {
                    let _ = writeln!(out, "[R] {}", self.line(candidate, false, None).await);
                }
            }
        }
    }

    async fn render_tldr(&self, out: &mut String, primary: &[Candidate], related: &[Candidate]) {
        out.push_str("Primary entities:\n");
        for candidate in primary {
            let _ = writeln!(out, "- {}", self.line(candidate, true, None).await);
        }
        out.push_str("Related entities:\n");
        for candidate in related {
            let _ = writeln!(out, "- {}", self.line(candidate, false, None).await);
        }

        let mut counts: Vec<(String, usize)> = Vec::new();
        for candidate in primary.iter().chain(related.iter()) {
            let area = self.area_tag(candidate).await;
            match counts.iter_mut().find(|(a, _)| *a == area) {
                Some((_, count)) => *count += 1,
                None => counts.push((area, 1)),
            }
        }
        let summary: Vec<String> = counts.iter().map(|(area, count)| format!("{area}({count} entities)")).collect();
        let _ = write!(out, "TL;DR: {}", summary.join(", "));
    }

    async fn render_hierarchical(&self, out: &mut String, primary: &[Candidate], related: &[Candidate]) {
        out.push_str("Primary:\n");
        for candidate in primary.iter().filter(|c| !c.synthetic_from_memory) {
            let _ = writeln!(out, "- {}", self.line(candidate, true, None).await);
        }
        out.push_str("Secondary:\n");
        for candidate in related.iter().filter(|c| !c.synthetic_from_memory) {
            let _ = writeln!(out, "- {}", self.line(candidate, false, None).await);
        }
        out.push_str("Previous:\n");
        for candidate in primary.iter().chain(related.iter()).filter(|c| c.synthetic_from_memory) {
            let _ = writeln!(out, "- {}", self.line(candidate, false, None).await);
        }
    }

    async fn render_detailed(&self, out: &mut String, primary: &[Candidate], related: &[Candidate], context: &ConversationContext) {
        let primary_label = if primary.len() == 1 { "Primary entity" } else { "Primary entities" };
        let _ = writeln!(out, "{primary_label}:");
        for candidate in primary {
            let _ = writeln!(out, "- {}", self.line(candidate, true, None).await);
        }
        out.push_str("Related entities:\n");
        for candidate in related {
            let _ = writeln!(out, "- {}", self.line(candidate, false, None).await);
        }
        let mut areas: Vec<&String> = context.areas_mentioned.iter().collect();
        areas.sort();
        let labels: Vec<String> = areas.into_iter().cloned().collect();
        let _ = write!(out, "Areas: {}", labels.join(", "));
    }
}

fn candidate_is_primary(primary: &[Candidate], candidate: &Candidate) -> bool {
    primary.iter().any(|p| p.entity.entity_id == candidate.entity.entity_id)
}
