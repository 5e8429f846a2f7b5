//! Retrieval context builder for the single-shot agent.
//!
//! A query is classified once against two ordered tables: keyword rules
//! that select entity categories, and detail sections triggered by either a
//! selected category or a keyword of their own. Matching is plain substring
//! search on the lowercased query.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use tracing::{debug, warn};

use crate::error::FactError;
use crate::facts::{Entity, FactQuery, Triple};

/// Entity categories known to the classifier.
///
/// Declaration order is the order listing sections appear in a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Light-absorbing semiconductor.
    Absorber,
    /// Generic material.
    Material,
    /// Semiconductor.
    Semiconductor,
    /// Electron or hole transport layer.
    TransportLayer,
    /// Contact electrode.
    Electrode,
    /// Encapsulation material.
    Encapsulant,
    /// Cell architecture.
    CellArchitecture,
    /// Fabrication process.
    FabricationProcess,
    /// Characterisation technique.
    CharacterisationTechnique,
    /// Material defect.
    Defect,
    /// Performance metric.
    PerformanceMetric,
    /// Degradation mechanism.
    DegradationMechanism,
    /// Research institution or company.
    Institution,
    /// Researcher.
    Researcher,
    /// Standard test procedure.
    StandardTest,
}

impl Category {
    /// Entity type tag in the fact base.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Absorber => "Absorber",
            Self::Material => "Material",
            Self::Semiconductor => "Semiconductor",
            Self::TransportLayer => "TransportLayer",
            Self::Electrode => "Electrode",
            Self::Encapsulant => "Encapsulant",
            Self::CellArchitecture => "CellArchitecture",
            Self::FabricationProcess => "FabricationProcess",
            Self::CharacterisationTechnique => "CharacterisationTechnique",
            Self::Defect => "Defect",
            Self::PerformanceMetric => "PerformanceMetric",
            Self::DegradationMechanism => "DegradationMechanism",
            Self::Institution => "Institution",
            Self::Researcher => "Researcher",
            Self::StandardTest => "StandardTest",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Detail sections appended after the per-category listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Absorbers with bandgap and crystal structure.
    AbsorberProperties,
    /// Architectures by record efficiency.
    ArchitectureEfficiencies,
    /// Defects and the metrics they affect.
    DefectImpacts,
    /// Every entity-to-entity relation.
    Relationships,
    /// Researchers with attributes and affiliations.
    Researchers,
    /// Performance metrics with units and ranges.
    Metrics,
    /// Degradation mechanisms with their causes.
    Degradation,
    /// Institutions with country and founding year.
    Institutions,
}

struct Rule {
    keywords: &'static [&'static str],
    categories: &'static [Category],
}

struct SectionRule {
    section: Section,
    categories: &'static [Category],
    keywords: &'static [&'static str],
}

use Category as C;

const RULES: &[Rule] = &[
    Rule {
        keywords: &["absorber", "absorbers"],
        categories: &[C::Absorber],
    },
    Rule {
        keywords: &["material", "materials"],
        categories: &[C::Material],
    },
    Rule {
        keywords: &["semiconductor", "semiconductors"],
        categories: &[C::Semiconductor],
    },
    Rule {
        keywords: &["transport", "transport layer"],
        categories: &[C::TransportLayer],
    },
    Rule {
        keywords: &["electrode", "electrodes"],
        categories: &[C::Electrode],
    },
    Rule {
        keywords: &["encapsulant"],
        categories: &[C::Encapsulant],
    },
    Rule {
        keywords: &["architecture", "architectures", "cell", "cells"],
        categories: &[C::CellArchitecture],
    },
    Rule {
        keywords: &["process", "processes", "fabrication"],
        categories: &[C::FabricationProcess],
    },
    Rule {
        keywords: &["characterisation", "characterization", "technique"],
        categories: &[C::CharacterisationTechnique],
    },
    Rule {
        keywords: &["defect", "defects"],
        categories: &[C::Defect],
    },
    Rule {
        keywords: &["metric", "metrics", "performance"],
        categories: &[C::PerformanceMetric],
    },
    Rule {
        keywords: &["degradation"],
        categories: &[C::DegradationMechanism],
    },
    Rule {
        keywords: &["institution", "institutions"],
        categories: &[C::Institution],
    },
    Rule {
        keywords: &["researcher", "researchers"],
        categories: &[C::Researcher],
    },
    Rule {
        keywords: &["standard", "test"],
        categories: &[C::StandardTest],
    },
    // Domain vocabulary.
    Rule {
        keywords: &["perovskite", "mapbi3", "fapbi3", "silicon", "cigs", "cdte", "gaas", "organic"],
        categories: &[C::Absorber],
    },
    Rule {
        keywords: &["efficiency", "record", "pce", "voc", "jsc", "fill factor"],
        categories: &[C::PerformanceMetric, C::CellArchitecture],
    },
    Rule {
        keywords: &["degrade", "stability", "moisture", "thermal", "uv"],
        categories: &[C::DegradationMechanism, C::Defect],
    },
    Rule {
        keywords: &["ito", "spiro", "ptaa", "tio2", "sno2", "c60", "fullerene"],
        categories: &[C::TransportLayer, C::Electrode],
    },
    Rule {
        keywords: &["spin coat", "sputtering", "evaporation", "czochralski", "pecvd", "anneal"],
        categories: &[C::FabricationProcess],
    },
    Rule {
        keywords: &["xrd", "sem", "tem", "pl ", "trpl", "eqe", "dlts", "ellipsom"],
        categories: &[C::CharacterisationTechnique],
    },
    Rule {
        keywords: &["nrel", "fraunhofer", "epfl", "kaust", "hzb", "oxford", "longi", "first solar"],
        categories: &[C::Institution],
    },
];

const SECTIONS: &[SectionRule] = &[
    SectionRule {
        section: Section::AbsorberProperties,
        categories: &[C::Absorber],
        keywords: &["bandgap", "absorber", "semiconductor"],
    },
    SectionRule {
        section: Section::ArchitectureEfficiencies,
        categories: &[C::CellArchitecture],
        keywords: &["tandem", "perc", "topcon", "shj", "pin", "nip"],
    },
    SectionRule {
        section: Section::DefectImpacts,
        categories: &[C::Defect],
        keywords: &[],
    },
    SectionRule {
        section: Section::Relationships,
        categories: &[],
        keywords: &["relationship", "connect", "related", "compatible", "link", "used in"],
    },
    SectionRule {
        section: Section::Researchers,
        categories: &[C::Researcher],
        keywords: &["gratzel", "snaith", "miyasaka", "sargent"],
    },
    SectionRule {
        section: Section::Metrics,
        categories: &[C::PerformanceMetric],
        keywords: &[],
    },
    SectionRule {
        section: Section::Degradation,
        categories: &[C::DegradationMechanism],
        keywords: &[],
    },
    SectionRule {
        section: Section::Institutions,
        categories: &[C::Institution],
        keywords: &[],
    },
];

/// Result of classifying one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Selected categories, in declaration order.
    pub categories: BTreeSet<Category>,
    /// Triggered detail sections, in table order.
    pub sections: Vec<Section>,
}

impl Classification {
    /// Returns true when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.sections.is_empty()
    }
}

/// Classifies a query against the rule tables.
#[must_use]
pub fn classify(query: &str) -> Classification {
    let q = query.to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|k| q.contains(k));

    let categories: BTreeSet<Category> = RULES
        .iter()
        .filter(|rule| hit(rule.keywords))
        .flat_map(|rule| rule.categories.iter().copied())
        .collect();

    let sections = SECTIONS
        .iter()
        .filter(|s| s.categories.iter().any(|c| categories.contains(c)) || hit(s.keywords))
        .map(|s| s.section)
        .collect();

    Classification {
        categories,
        sections,
    }
}

/// Builds the retrieval context for `query`.
///
/// Returns an empty string when nothing in the fact base relates to the
/// query (and `overview_fallback` is off). A failing lookup drops only its
/// own section.
#[must_use]
pub fn build_context(facts: &dyn FactQuery, query: &str, overview_fallback: bool) -> String {
    let classification = classify(query);
    debug!(
        categories = classification.categories.len(),
        sections = classification.sections.len(),
        "query classified"
    );

    let mut out = String::new();
    for category in &classification.categories {
        section(&mut out, category.type_name(), || {
            listing_section(facts, *category)
        });
    }
    let mut relations: Option<Vec<Triple>> = None;
    for s in &classification.sections {
        section(&mut out, "detail", || {
            detail_section(facts, *s, &mut relations)
        });
    }

    if out.is_empty() {
        section(&mut out, "entity-name fallback", || {
            named_entities_section(facts, &query.to_lowercase())
        });
    }
    if out.is_empty() && overview_fallback {
        section(&mut out, "overview", || overview_section(facts));
    }
    out.trim_start_matches('\n').to_string()
}

fn section<F>(out: &mut String, label: &str, build: F)
where
    F: FnOnce() -> Result<String, FactError>,
{
    match build() {
        Ok(text) => out.push_str(&text),
        Err(e) => warn!(section = label, error = %e, "context section skipped"),
    }
}

/// Truncates to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(i, _)| &s[..i])
}

fn desc(entity_desc: Option<&String>, max: usize) -> &str {
    entity_desc.map_or("", |d| truncate_chars(d, max))
}

fn listing_section(facts: &dyn FactQuery, category: Category) -> Result<String, FactError> {
    let rows = facts.list_entities(Some(category.type_name()))?;
    let mut out = String::new();
    if rows.is_empty() {
        return Ok(out);
    }
    let _ = writeln!(out, "\n## {category}s");
    for e in &rows {
        let _ = writeln!(
            out,
            "- **{}**: {}",
            e.name,
            e.description.as_deref().unwrap_or("N/A")
        );
    }
    Ok(out)
}

fn fmt_number(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn detail_section(
    facts: &dyn FactQuery,
    section: Section,
    relations: &mut Option<Vec<Triple>>,
) -> Result<String, FactError> {
    let mut out = String::new();
    match section {
        Section::AbsorberProperties => {
            let rows = facts.absorbers()?;
            if !rows.is_empty() {
                out.push_str("\n## Absorber Materials: Key Properties\n");
                for a in &rows {
                    let _ = writeln!(
                        out,
                        "- **{}** | Bandgap: {} eV | Crystal: {}",
                        a.name,
                        fmt_number(a.bandgap_ev),
                        a.crystal_structure.as_deref().unwrap_or("N/A")
                    );
                }
            }
        }
        Section::ArchitectureEfficiencies => {
            let rows = facts.architectures()?;
            if !rows.is_empty() {
                out.push_str("\n## Cell Architectures: Record Efficiencies\n");
                for a in &rows {
                    let _ = writeln!(
                        out,
                        "- **{}**: {}% record PCE: {}",
                        a.name,
                        fmt_number(a.record_efficiency_pct),
                        desc(a.description.as_ref(), 120)
                    );
                }
            }
        }
        Section::DefectImpacts => {
            let rows = facts.defects_with_impacts()?;
            if !rows.is_empty() {
                out.push_str("\n## Defects and Performance Impacts\n");
                let mut current: Option<&str> = None;
                for d in &rows {
                    if current != Some(d.defect.as_str()) {
                        current = Some(d.defect.as_str());
                        let _ = writeln!(
                            out,
                            "- **{}**: {}",
                            d.defect,
                            desc(d.description.as_ref(), 100)
                        );
                    }
                    if let Some(metric) = &d.metric {
                        let _ = writeln!(out, "  → affects: {metric}");
                    }
                }
            }
        }
        Section::Relationships => {
            let rows = cached_relations(facts, relations)?;
            if !rows.is_empty() {
                out.push_str("\n## All Relationships\n");
                for r in rows {
                    let _ = writeln!(out, "- {} → [{}] → {}", r.subject, r.relation, r.object);
                }
            }
        }
        Section::Researchers => {
            attribute_listing(facts, relations, &mut out, C::Researcher, "Researchers")?;
        }
        Section::Metrics => {
            attribute_listing(
                facts,
                relations,
                &mut out,
                C::PerformanceMetric,
                "Performance Metrics",
            )?;
        }
        Section::Degradation => {
            attribute_listing(
                facts,
                relations,
                &mut out,
                C::DegradationMechanism,
                "Degradation Mechanisms",
            )?;
        }
        Section::Institutions => {
            attribute_listing(
                facts,
                relations,
                &mut out,
                C::Institution,
                "Research Institutions and Companies",
            )?;
        }
    }
    Ok(out)
}

fn cached_relations<'a>(
    facts: &dyn FactQuery,
    relations: &'a mut Option<Vec<Triple>>,
) -> Result<&'a [Triple], FactError> {
    if relations.is_none() {
        *relations = Some(facts.relationships()?);
    }
    Ok(relations.as_deref().unwrap_or_default())
}

/// Lists entities of one type with their literal attributes and outgoing
/// relations.
fn attribute_listing(
    facts: &dyn FactQuery,
    relations: &mut Option<Vec<Triple>>,
    out: &mut String,
    category: Category,
    heading: &str,
) -> Result<(), FactError> {
    let rows: Vec<Entity> = facts.list_entities(Some(category.type_name()))?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut outgoing: HashMap<&str, Vec<&Triple>> = HashMap::new();
    for t in cached_relations(facts, relations)? {
        outgoing.entry(t.subject.as_str()).or_default().push(t);
    }

    let _ = writeln!(out, "\n## {heading}");
    for e in &rows {
        let mut extras: Vec<String> = e
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        if let Some(links) = outgoing.get(e.name.as_str()) {
            extras.extend(links.iter().map(|t| format!("{}: {}", t.relation, t.object)));
        }
        let extras = if extras.is_empty() {
            String::new()
        } else {
            format!(" ({})", extras.join("; "))
        };
        let _ = writeln!(
            out,
            "- **{}**{extras}: {}",
            e.name,
            desc(e.description.as_ref(), 120)
        );
    }
    Ok(())
}

fn named_entities_section(facts: &dyn FactQuery, q: &str) -> Result<String, FactError> {
    let mut out = String::new();
    for e in facts.list_entities(None)? {
        if e.name.is_empty() || !q.contains(&e.name.to_lowercase()) {
            continue;
        }
        let _ = writeln!(out, "\n## {} ({})", e.name, e.entity_type);
        let _ = writeln!(
            out,
            "**Description**: {}",
            e.description.as_deref().unwrap_or("N/A")
        );
        for d in facts.entity_details(&e.name)? {
            if matches!(d.relation.as_str(), "name" | "description") {
                continue;
            }
            if let Some(obj) = d.object() {
                let _ = writeln!(out, "- {}: {obj}", d.relation);
            }
        }
    }
    Ok(out)
}

fn overview_section(facts: &dyn FactQuery) -> Result<String, FactError> {
    let summary = facts.summary()?;
    let mut out = String::from("## PV Solar Knowledge Graph: Overview\n");
    let _ = writeln!(out, "- Total facts: {}", summary.total_facts);
    for (kind, count) in &summary.by_type {
        let _ = writeln!(out, "- {kind}: {count}");
    }
    out.push_str("\n## Cell Architectures by Record Efficiency\n");
    for a in facts.architectures()? {
        let _ = writeln!(
            out,
            "- **{}**: {}% ({})",
            a.name,
            fmt_number(a.record_efficiency_pct),
            desc(a.description.as_ref(), 80)
        );
    }
    out.push_str("\n## Absorber Materials\n");
    for a in facts.absorbers()? {
        let _ = writeln!(out, "- **{}** (bandgap {} eV)", a.name, fmt_number(a.bandgap_ev));
    }
    Ok(out)
}
