//! Reference executors
//!
//! Deliberately shallow line/field-level passes over the primary input.
//! They exist so the engine runs end-to-end and the dispatch table has a
//! complete implementation per kind; real deployments register their own
//! executors behind the same trait.

use super::{AgentExecError, AgentExecutor, AgentInvocation, AgentOutput, NamedArtifact, TransformedFile};
use crate::catalog::AgentKind;
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

/// All reference executors, one per `AgentKind`
pub fn all() -> Vec<Arc<dyn AgentExecutor>> {
    vec![
        Arc::new(SchemaProfiler),
        Arc::new(NullAuditor),
        Arc::new(OutlierScanner),
        Arc::new(PiiScanner),
        Arc::new(ValueNormalizer),
        Arc::new(DuplicateResolver),
    ]
}

const PRIMARY: &str = "primary";

fn utf8_lines(bytes: &Bytes) -> Result<Vec<&str>, AgentExecError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AgentExecError::ExecutionFailed(format!("input is not UTF-8: {e}")))?;
    Ok(text.lines().collect())
}

pub struct SchemaProfiler;

#[async_trait]
impl AgentExecutor for SchemaProfiler {
    fn kind(&self) -> AgentKind {
        AgentKind::SchemaProfiler
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        let primary = invocation.file(PRIMARY)?;
        let lines = utf8_lines(primary)?;
        let columns = lines
            .first()
            .map(|header| header.split(',').count())
            .unwrap_or(0);
        Ok(AgentOutput {
            findings: json!({
                "rows": lines.len().saturating_sub(1),
                "columns": columns,
                "bytes": primary.len(),
            }),
            ..Default::default()
        })
    }
}

pub struct NullAuditor;

#[async_trait]
impl AgentExecutor for NullAuditor {
    fn kind(&self) -> AgentKind {
        AgentKind::NullAuditor
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        let lines = utf8_lines(invocation.file(PRIMARY)?)?;
        let empty_cells: usize = lines
            .iter()
            .skip(1)
            .map(|line| line.split(',').filter(|cell| cell.trim().is_empty()).count())
            .sum();
        Ok(AgentOutput {
            findings: json!({ "empty_cells": empty_cells }),
            ..Default::default()
        })
    }
}

pub struct OutlierScanner;

#[async_trait]
impl AgentExecutor for OutlierScanner {
    fn kind(&self) -> AgentKind {
        AgentKind::OutlierScanner
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        let lines = utf8_lines(invocation.file(PRIMARY)?)?;
        let values: Vec<f64> = lines
            .iter()
            .skip(1)
            .flat_map(|line| line.split(','))
            .filter_map(|cell| cell.trim().parse::<f64>().ok())
            .collect();
        let extreme = values.iter().filter(|v| v.abs() > 1_000_000.0).count();
        Ok(AgentOutput {
            findings: json!({
                "numeric_values": values.len(),
                "extreme_values": extreme,
            }),
            ..Default::default()
        })
    }
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

pub struct PiiScanner;

#[async_trait]
impl AgentExecutor for PiiScanner {
    fn kind(&self) -> AgentKind {
        AgentKind::PiiScanner
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        let primary = invocation.file(PRIMARY)?;
        let text = std::str::from_utf8(primary)
            .map_err(|e| AgentExecError::ExecutionFailed(format!("input is not UTF-8: {e}")))?;
        let emails = EMAIL_RE.find_iter(text).count();
        Ok(AgentOutput {
            findings: json!({ "email_like_values": emails }),
            ..Default::default()
        })
    }
}

pub struct ValueNormalizer;

#[async_trait]
impl AgentExecutor for ValueNormalizer {
    fn kind(&self) -> AgentKind {
        AgentKind::ValueNormalizer
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        let lines = utf8_lines(invocation.file(PRIMARY)?)?;
        let normalized: Vec<String> = lines
            .iter()
            .map(|line| {
                line.split(',')
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();
        let bytes = Bytes::from(normalized.join("\n"));
        Ok(AgentOutput {
            findings: json!({ "normalized_rows": normalized.len() }),
            transformed: Some(TransformedFile {
                logical_name: PRIMARY.to_string(),
                bytes: bytes.clone(),
            }),
            artifact: Some(NamedArtifact {
                name: "normalized.csv".to_string(),
                bytes,
            }),
        })
    }
}

pub struct DuplicateResolver;

#[async_trait]
impl AgentExecutor for DuplicateResolver {
    fn kind(&self) -> AgentKind {
        AgentKind::DuplicateResolver
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        let lines = utf8_lines(invocation.file(PRIMARY)?)?;
        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::new();
        for line in &lines {
            if seen.insert(*line) {
                kept.push(*line);
            }
        }
        let removed = lines.len() - kept.len();
        let bytes = Bytes::from(kept.join("\n"));
        Ok(AgentOutput {
            findings: json!({ "duplicates_removed": removed, "rows_kept": kept.len() }),
            transformed: Some(TransformedFile {
                logical_name: PRIMARY.to_string(),
                bytes: bytes.clone(),
            }),
            artifact: Some(NamedArtifact {
                name: "deduplicated.csv".to_string(),
                bytes,
            }),
        })
    }
}
