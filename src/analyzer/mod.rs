pub mod cluster;
pub mod graph;
pub mod message;
pub mod scanner;

use anyhow::Result;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::db::models::Status;
use crate::db::Database;
use crate::fixer::resolver::{find_best_fix, ResolvedFix};
use crate::oracle::{AdvisoryOracle, OracleRequest};
use crate::report::{AnalyzeReport, ScanReport};

/// Scan phase: invoke the analyzer and reconcile its findings
pub fn run_scan(db: &Database, root: &Path, config: &Config) -> Result<ScanReport> {
    scanner::scan(db, root, &config.analyzer)
}

/// Analyze phase: link patterns, rebuild the dependency graph and the
/// clusters, optionally consult the advisory oracle, and surface which
/// diagnostics have a fix candidate.
pub fn run_analyze(
    db: &Database,
    config: &Config,
    oracle: Option<&dyn AdvisoryOracle>,
) -> Result<AnalyzeReport> {
    let start = Instant::now();
    let mut report = AnalyzeReport {
        oracle_enabled: oracle.is_some(),
        ..AnalyzeReport::default()
    };

    // Pattern linking first so the resolver sees it below.
    for diagnostic in db.live_diagnostics()? {
        if diagnostic.status == Status::Detected {
            db.set_diagnostic_status(diagnostic.id, Status::Analyzing)?;
        }
        if diagnostic.pattern_id.is_none() {
            let skeleton = message::message_skeleton(&diagnostic.message);
            let pattern_id = db.upsert_pattern(&diagnostic.code, &skeleton)?;
            db.set_diagnostic_pattern(diagnostic.id, pattern_id)?;
            report.patterns_linked += 1;
        }
    }

    let diagnostics = db.live_diagnostics()?;
    report.diagnostics_analyzed = diagnostics.len() as u64;

    let dependency_graph = graph::build_graph(&diagnostics);
    db.replace_edges(&dependency_graph.edges)?;
    report.edges = dependency_graph.edges.len() as u64;
    report.root_causes = dependency_graph.root_causes().len() as u64;

    let mut drafts = cluster::cluster(&diagnostics, &dependency_graph);
    for draft in &mut drafts {
        let representative = diagnostics
            .iter()
            .find(|d| d.id == draft.representative_id);
        if let Some(rep) = representative {
            if let Some(ResolvedFix::Persisted(fix)) = find_best_fix(db, rep)? {
                draft.suggested_fix_id = Some(fix.id);
            }
        }
    }
    db.replace_clusters(&drafts)?;
    report.clusters = drafts.len() as u64;

    if let Some(oracle) = oracle {
        consult_oracle(db, config, oracle, &dependency_graph, &mut report)?;
    }

    // With patterns and advice in place, surface fix availability.
    for diagnostic in db.live_diagnostics()? {
        if find_best_fix(db, &diagnostic)?.is_some() {
            db.set_diagnostic_status(diagnostic.id, Status::FixAvailable)?;
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

/// Send the quota's worth of diagnostics (root causes first) to the
/// oracle; any failure degrades to a note in the report
fn consult_oracle(
    db: &Database,
    config: &Config,
    oracle: &dyn AdvisoryOracle,
    dependency_graph: &graph::DependencyGraph,
    report: &mut AnalyzeReport,
) -> Result<()> {
    let order = graph::topological_order(dependency_graph);
    let mut requests = Vec::new();
    for id in order.into_iter().take(config.oracle.quota) {
        if let Some(diag) = db.get_diagnostic(id)? {
            requests.push(OracleRequest {
                diagnostic_id: diag.id,
                file: diag.file,
                line: diag.line,
                code: diag.code,
                message: diag.message,
                context_line: diag.context_line,
            });
        }
    }

    match oracle.batch_analyze(&requests) {
        Ok(advice) => {
            for item in advice {
                if db.get_diagnostic(item.diagnostic_id)?.is_none() {
                    continue;
                }
                db.put_advice(
                    item.diagnostic_id,
                    &item.explanation,
                    &item.suggested_fix,
                    item.confidence.clamp(0.0, 1.0),
                )?;
                report.advice_collected += 1;
            }
        }
        Err(err) => {
            report.oracle_note = Some(format!("oracle degraded: {err:#}"));
        }
    }
    Ok(())
}
