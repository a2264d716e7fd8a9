use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use redb_core::config::MatchingConfig;
use redb_core::db::{DescriptionRecord, QueryRunRecord, QueryRunStatus};
use redb_core::model::MatchResult;
use redb_core::services::{MatchError, Matcher, QueryStats};
use serde::Serialize;

use crate::commands::{open_project, read_fingerprints, read_single_fingerprint, resolve_matching_config};

#[derive(Serialize)]
pub struct MatchReport {
    #[serde(flatten)]
    pub result: MatchResult,
    pub descriptions: Vec<DescriptionRecord>,
}

#[derive(Serialize)]
pub struct QueryReport {
    pub query_signature: String,
    pub query_name: String,
    pub stats: QueryStats,
    pub matches: Vec<MatchReport>,
}

/// Match every fingerprint in `file` against the project corpus.
pub fn query_command(
    root: &str,
    file: &str,
    config_path: Option<&str>,
    top: Option<usize>,
    json: bool,
) -> Result<()> {
    let ctx = open_project(root)?;
    let config = resolve_matching_config(config_path, ctx.config.matching.clone())?;
    let digest = config.digest();
    let matcher = Matcher::new(config)?;
    let queries = read_fingerprints(Path::new(file))?;

    let mut reports = Vec::with_capacity(queries.len());
    for query in &queries {
        let started_at = Utc::now().to_rfc3339();
        let outcome = matcher.query(query, &ctx.db);
        let finished_at = Utc::now().to_rfc3339();

        let mut run = QueryRunRecord {
            query_signature: query.signature().to_string(),
            config_digest: digest.clone(),
            status: QueryRunStatus::Succeeded,
            corpus_size: 0,
            survivors: 0,
            matches: 0,
            best_match: None,
            started_at,
            finished_at,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                run.status = match err {
                    MatchError::Cancelled => QueryRunStatus::Canceled,
                    _ => QueryRunStatus::Failed,
                };
                ctx.db.insert_query_run(&run).context("Failed to record query run")?;
                return Err(err)
                    .with_context(|| format!("Query {} failed", query.signature()));
            }
        };
        run.corpus_size = outcome.stats.corpus as u64;
        run.survivors = outcome.stats.dictionary_survivors as u64;
        run.matches = outcome.stats.accepted as u64;
        run.best_match = outcome.matches.first().map(|m| m.signature.clone());
        ctx.db.insert_query_run(&run).context("Failed to record query run")?;

        let limit = top.unwrap_or(usize::MAX);
        let mut matches = Vec::new();
        for result in outcome.matches.into_iter().take(limit) {
            let descriptions = ctx
                .db
                .descriptions_for(&result.signature)
                .with_context(|| format!("Failed to load descriptions of {}", result.signature))?;
            matches.push(MatchReport { result, descriptions });
        }
        reports.push(QueryReport {
            query_signature: query.signature().to_string(),
            query_name: query.name().to_string(),
            stats: outcome.stats,
            matches,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!(
            "Query {} ({}): {} candidate(s), {} scored",
            report.query_signature, report.query_name, report.stats.corpus, report.stats.graph_scored
        );
        if report.matches.is_empty() {
            println!("  No matches");
            continue;
        }
        for (rank, m) in report.matches.iter().enumerate() {
            let r = &m.result;
            println!(
                "  {}. {:.4} {} {} ({}){}",
                rank + 1,
                r.grade,
                r.signature,
                r.name,
                r.exe_name,
                if r.exact { "" } else { " [provisional]" }
            );
            for d in &m.descriptions {
                println!("       {}: {}", d.user, d.data);
            }
        }
    }
    Ok(())
}

/// Print the per-stage breakdown for one pair of fingerprints.
pub fn compare_command(
    left: &str,
    right: &str,
    config_path: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = resolve_matching_config(config_path, MatchingConfig::default())?;
    let matcher = Matcher::new(config)?;
    let query = read_single_fingerprint(Path::new(left))?;
    let candidate = read_single_fingerprint(Path::new(right))?;
    let comparison = matcher.compare(&query, &candidate)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    let verdict = |passed: bool| if passed { "pass" } else { "fail" };
    println!("{} vs {}", query.signature(), candidate.signature());
    println!("Coarse filter: {}", verdict(comparison.coarse_passed));
    for d in &comparison.coarse {
        println!(
            "  {:<12} {:>6} {:>6}  deviation {:.3} (max {:.2})",
            d.counter, d.query, d.candidate, d.deviation, d.tolerance
        );
    }
    println!(
        "Dictionary ratio: {:.4} ({})",
        comparison.dictionary_ratio,
        verdict(comparison.dictionary_passed)
    );
    println!(
        "Graph ratio: {:.4} via {:?}{}",
        comparison.graph.ratio,
        comparison.graph.method,
        if comparison.graph.exact { "" } else { " (not exact)" }
    );
    for pair in &comparison.block_pairs {
        println!("  block {} -> {}: {:.4}", pair.query, pair.candidate, pair.ratio);
    }
    println!("Frame ratio: {:.4}", comparison.frame_ratio);
    println!(
        "Grade: {:.4} ({})",
        comparison.grade,
        if comparison.accepted { "match" } else { "no match" }
    );
    Ok(())
}

/// List recorded query runs.
pub fn history_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let runs = ctx.db.list_query_runs().context("Failed to list query runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No query runs recorded.");
        return Ok(());
    }
    println!("Query runs:");
    for run in runs {
        println!(
            "  - {} [{}] {} match(es) of {} candidate(s), best: {} ({})",
            run.query_signature,
            run.status.as_str(),
            run.matches,
            run.corpus_size,
            run.best_match.as_deref().unwrap_or("-"),
            run.finished_at
        );
    }
    Ok(())
}
