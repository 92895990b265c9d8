use anyhow::Result;

use crate::db::models::{Category, Diagnostic, FixKind, FixMethod, StoredFix};
use crate::db::Database;

/// A fix candidate selected for one diagnostic. Ephemeral fixes have no
/// store identity yet; a successful application promotes them.
#[derive(Debug, Clone)]
pub enum ResolvedFix {
    Persisted(StoredFix),
    Ephemeral(EphemeralFix),
}

/// A not-yet-persisted candidate, produced by the advisory oracle or by
/// the generic code-pattern rules
#[derive(Debug, Clone)]
pub struct EphemeralFix {
    pub title: String,
    pub description: String,
    pub kind: FixKind,
    pub content: String,
    pub anchor: Option<String>,
    pub confidence: f64,
    pub method: FixMethod,
}

impl ResolvedFix {
    pub fn kind(&self) -> FixKind {
        match self {
            Self::Persisted(fix) => fix.kind,
            Self::Ephemeral(fix) => fix.kind,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Persisted(fix) => &fix.content,
            Self::Ephemeral(fix) => &fix.content,
        }
    }

    pub fn anchor(&self) -> Option<&str> {
        match self {
            Self::Persisted(fix) => fix.anchor.as_deref(),
            Self::Ephemeral(fix) => fix.anchor.as_deref(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Persisted(fix) => &fix.title,
            Self::Ephemeral(fix) => &fix.title,
        }
    }

    pub fn method(&self) -> FixMethod {
        match self {
            Self::Persisted(_) => FixMethod::Pattern,
            Self::Ephemeral(fix) => fix.method,
        }
    }
}

/// Rank fix candidates for one diagnostic and return the best, or None
/// when no tier applies. Read-only with respect to the store.
///
/// Resolution order: historically successful pattern fixes, then stored
/// advisory-oracle suggestions, then generic code-pattern rules.
pub fn find_best_fix(db: &Database, diagnostic: &Diagnostic) -> Result<Option<ResolvedFix>> {
    // Tier 1: the diagnostic's pattern, best track record first.
    if let Some(pattern_id) = diagnostic.pattern_id {
        let candidates = db.fixes_for_pattern(pattern_id)?;
        if let Some(best) = candidates.into_iter().next() {
            return Ok(Some(ResolvedFix::Persisted(best)));
        }
    }

    // Tier 2: advisory-oracle suggestion collected during analyze.
    if let Some(advice) = db.advice_for(diagnostic.id)? {
        if !advice.suggested_fix.trim().is_empty() {
            return Ok(Some(ResolvedFix::Ephemeral(EphemeralFix {
                title: "Apply advisory suggestion".to_string(),
                description: advice.explanation,
                kind: FixKind::ReplaceLine,
                content: advice.suggested_fix,
                anchor: diagnostic.context_line.clone(),
                confidence: advice.confidence,
                method: FixMethod::Advisory,
            })));
        }
    }

    // Tier 3: generic rules keyed by diagnostic shape.
    Ok(generic_rule(diagnostic).map(ResolvedFix::Ephemeral))
}

/// Built-in code-pattern rules. Each rule only fires when the captured
/// context line confirms the shape it rewrites.
fn generic_rule(diagnostic: &Diagnostic) -> Option<EphemeralFix> {
    let context = diagnostic.context_line.as_deref()?;

    match diagnostic.category {
        Category::MissingDeclaration => annotate_empty_container(context),
        Category::Syntax => insert_missing_colon(context),
        Category::ImportError if diagnostic.code == "no-redef" => {
            Some(EphemeralFix {
                title: "Remove duplicate definition".to_string(),
                description: "Delete the re-declared import/definition line".to_string(),
                kind: FixKind::DeleteLine,
                content: String::new(),
                anchor: Some(context.to_string()),
                confidence: 0.6,
                method: FixMethod::Automatic,
            })
        }
        Category::TypeMismatch => optionalize_none_assignment(diagnostic, context),
        _ => None,
    }
}

/// `items = []` / `cache = {}` with a "need type annotation" diagnostic
/// gets an explicit container annotation
fn annotate_empty_container(context: &str) -> Option<EphemeralFix> {
    let (suffix, annotation) = if context.trim_end().ends_with("= []") {
        ("= []", "list")
    } else if context.trim_end().ends_with("= {}") {
        ("= {}", "dict")
    } else {
        return None;
    };

    let head = context.trim_end().strip_suffix(suffix)?.trim_end();
    let replacement = format!("{head}: {annotation} {suffix}");
    Some(EphemeralFix {
        title: format!("Annotate as {annotation}"),
        description: "Add an explicit type annotation to the empty container".to_string(),
        kind: FixKind::ReplaceLine,
        content: replacement,
        anchor: Some(context.to_string()),
        confidence: 0.7,
        method: FixMethod::Automatic,
    })
}

/// `def f(x)` / `if cond` missing its trailing colon
fn insert_missing_colon(context: &str) -> Option<EphemeralFix> {
    let trimmed = context.trim_end();
    let looks_like_block = trimmed.starts_with("def ")
        || trimmed.starts_with("class ")
        || trimmed.starts_with("if ")
        || trimmed.starts_with("for ")
        || trimmed.starts_with("while ")
        || trimmed.starts_with("else")
        || trimmed.starts_with("elif ");
    if !looks_like_block || trimmed.ends_with(':') {
        return None;
    }

    Some(EphemeralFix {
        title: "Insert missing colon".to_string(),
        description: "Terminate the block header".to_string(),
        kind: FixKind::ReplaceLine,
        content: format!("{trimmed}:"),
        anchor: Some(context.to_string()),
        confidence: 0.65,
        method: FixMethod::Automatic,
    })
}

/// `x: T = None` mismatches get an Optional[T] annotation
fn optionalize_none_assignment(diagnostic: &Diagnostic, context: &str) -> Option<EphemeralFix> {
    if !diagnostic.message.contains("\"None\"") {
        return None;
    }
    let (head, tail) = context.split_once(':')?;
    let (annotation, value) = tail.split_once('=')?;
    let annotation = annotation.trim();
    if annotation.is_empty() || annotation.starts_with("Optional[") {
        return None;
    }

    let replacement = format!("{head}: Optional[{annotation}] ={value}");
    Some(EphemeralFix {
        title: "Wrap annotation in Optional".to_string(),
        description: "Allow None by widening the annotation".to_string(),
        kind: FixKind::ReplaceLine,
        content: replacement,
        anchor: Some(context.to_string()),
        confidence: 0.6,
        method: FixMethod::Automatic,
    })
}
