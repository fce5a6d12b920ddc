//! Tool and agent catalog
//!
//! The catalog is an immutable registry built once at startup and passed by
//! dependency injection into the orchestrator and the API layer. Agent
//! identifiers are a closed enum, so an unknown identifier is a
//! deserialization or startup error rather than a runtime string mismatch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of analysis and cleaning agents the engine can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// Column/shape profile of the primary dataset (analytical)
    SchemaProfiler,
    /// Missing-value audit (analytical)
    NullAuditor,
    /// Numeric outlier scan (analytical)
    OutlierScanner,
    /// Personally-identifiable-information scan (analytical)
    PiiScanner,
    /// Whitespace/format normalization (transforming)
    ValueNormalizer,
    /// Exact-duplicate removal (transforming)
    DuplicateResolver,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::SchemaProfiler => "schema-profiler",
            AgentKind::NullAuditor => "null-auditor",
            AgentKind::OutlierScanner => "outlier-scanner",
            AgentKind::PiiScanner => "pii-scanner",
            AgentKind::ValueNormalizer => "value-normalizer",
            AgentKind::DuplicateResolver => "duplicate-resolver",
        }
    }

    /// Every kind the engine knows about, in a stable order
    pub fn all() -> &'static [AgentKind] {
        &[
            AgentKind::SchemaProfiler,
            AgentKind::NullAuditor,
            AgentKind::OutlierScanner,
            AgentKind::PiiScanner,
            AgentKind::ValueNormalizer,
            AgentKind::DuplicateResolver,
        ]
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schema-profiler" => Ok(AgentKind::SchemaProfiler),
            "null-auditor" => Ok(AgentKind::NullAuditor),
            "outlier-scanner" => Ok(AgentKind::OutlierScanner),
            "pii-scanner" => Ok(AgentKind::PiiScanner),
            "value-normalizer" => Ok(AgentKind::ValueNormalizer),
            "duplicate-resolver" => Ok(AgentKind::DuplicateResolver),
            other => Err(CatalogError::UnknownAgent(other.to_string())),
        }
    }
}

/// Per-agent catalog entry: cost and whether its output replaces an input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub kind: AgentKind,
    /// Credits charged for one execution of this agent
    pub credits: u32,
    /// Transforming agents feed their output back into the pipeline context
    /// under the same logical key; analytical agents never mutate it
    #[serde(default)]
    pub transforming: bool,
    #[serde(default)]
    pub description: String,
}

/// Policy deciding whether a run with some failed agents still completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SuccessPolicy {
    /// At least one agent must succeed
    #[default]
    Any,
    /// Every agent in the resolved list must succeed
    All,
}

/// A named, ordered bundle of agents and their required input files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Execution order is exactly this order; never reordered
    pub agents: Vec<AgentKind>,
    /// Logical input names that must exist before processing may start
    pub required_inputs: Vec<String>,
    /// Logical input names the tool accepts but does not require
    #[serde(default)]
    pub optional_inputs: Vec<String>,
    #[serde(default)]
    pub success_policy: SuccessPolicy,
}

impl ToolSpec {
    /// True if `name` is a logical input this tool accepts
    pub fn accepts_input(&self, name: &str) -> bool {
        self.required_inputs.iter().any(|n| n == name)
            || self.optional_inputs.iter().any(|n| n == name)
    }
}

/// Catalog construction errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Unknown agent identifier: {0}")]
    UnknownAgent(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool '{0}' declares an empty agent list")]
    EmptyPipeline(String),
    #[error("Duplicate tool id: {0}")]
    DuplicateTool(String),
    #[error("Tool '{tool}' references agent '{agent}' with no catalog entry")]
    MissingAgentSpec { tool: String, agent: AgentKind },
}

/// Immutable registry of tools and agent specs, built once at startup
#[derive(Debug, Clone)]
pub struct Catalog {
    agents: HashMap<AgentKind, AgentSpec>,
    tools: HashMap<String, ToolSpec>,
}

impl Catalog {
    /// Build a catalog from explicit parts, validating cross-references
    pub fn new(agents: Vec<AgentSpec>, tools: Vec<ToolSpec>) -> Result<Self, CatalogError> {
        let agent_map: HashMap<AgentKind, AgentSpec> =
            agents.into_iter().map(|spec| (spec.kind, spec)).collect();

        let mut tool_map = HashMap::new();
        for tool in tools {
            if tool.agents.is_empty() {
                return Err(CatalogError::EmptyPipeline(tool.id));
            }
            for agent in &tool.agents {
                if !agent_map.contains_key(agent) {
                    return Err(CatalogError::MissingAgentSpec {
                        tool: tool.id,
                        agent: *agent,
                    });
                }
            }
            if tool_map.contains_key(&tool.id) {
                return Err(CatalogError::DuplicateTool(tool.id));
            }
            tool_map.insert(tool.id.clone(), tool);
        }

        Ok(Self {
            agents: agent_map,
            tools: tool_map,
        })
    }

    /// Default catalog shipped with the engine
    pub fn builtin() -> Self {
        let agents = vec![
            AgentSpec {
                kind: AgentKind::SchemaProfiler,
                credits: 5,
                transforming: false,
                description: "Column and shape profile".to_string(),
            },
            AgentSpec {
                kind: AgentKind::NullAuditor,
                credits: 5,
                transforming: false,
                description: "Missing-value audit".to_string(),
            },
            AgentSpec {
                kind: AgentKind::OutlierScanner,
                credits: 10,
                transforming: false,
                description: "Numeric outlier scan".to_string(),
            },
            AgentSpec {
                kind: AgentKind::PiiScanner,
                credits: 10,
                transforming: false,
                description: "PII pattern scan".to_string(),
            },
            AgentSpec {
                kind: AgentKind::ValueNormalizer,
                credits: 15,
                transforming: true,
                description: "Whitespace and format normalization".to_string(),
            },
            AgentSpec {
                kind: AgentKind::DuplicateResolver,
                credits: 15,
                transforming: true,
                description: "Exact duplicate removal".to_string(),
            },
        ];

        let tools = vec![
            ToolSpec {
                id: "quality-report".to_string(),
                description: "Profile, null audit and outlier scan".to_string(),
                agents: vec![
                    AgentKind::SchemaProfiler,
                    AgentKind::NullAuditor,
                    AgentKind::OutlierScanner,
                ],
                required_inputs: vec!["primary".to_string()],
                optional_inputs: vec!["parameters".to_string()],
                success_policy: SuccessPolicy::Any,
            },
            ToolSpec {
                id: "privacy-audit".to_string(),
                description: "PII scan with schema context".to_string(),
                agents: vec![AgentKind::SchemaProfiler, AgentKind::PiiScanner],
                required_inputs: vec!["primary".to_string()],
                optional_inputs: vec!["parameters".to_string()],
                success_policy: SuccessPolicy::All,
            },
            ToolSpec {
                id: "clean-and-profile".to_string(),
                description: "Normalize, dedupe, then profile the cleaned data".to_string(),
                agents: vec![
                    AgentKind::ValueNormalizer,
                    AgentKind::DuplicateResolver,
                    AgentKind::SchemaProfiler,
                    AgentKind::NullAuditor,
                ],
                required_inputs: vec!["primary".to_string()],
                optional_inputs: vec!["baseline".to_string(), "parameters".to_string()],
                success_policy: SuccessPolicy::Any,
            },
        ];

        Self::new(agents, tools).expect("builtin catalog is valid")
    }

    /// Build from the `[catalog]` configuration section
    pub fn from_config(config: CatalogConfig) -> Result<Self, CatalogError> {
        let agents = config
            .agents
            .into_iter()
            .map(|(kind, entry)| AgentSpec {
                kind,
                credits: entry.credits,
                transforming: entry.transforming,
                description: entry.description,
            })
            .collect();
        Self::new(agents, config.tools)
    }

    pub fn tool(&self, id: &str) -> Option<&ToolSpec> {
        self.tools.get(id)
    }

    pub fn agent(&self, kind: AgentKind) -> Option<&AgentSpec> {
        self.agents.get(&kind)
    }

    pub fn tool_ids(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Per-agent price table handed to the billing ledger at startup
    pub fn price_table(&self) -> HashMap<AgentKind, u32> {
        self.agents
            .iter()
            .map(|(kind, spec)| (*kind, spec.credits))
            .collect()
    }
}

/// `[catalog]` section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub agents: HashMap<AgentKind, CatalogAgentEntry>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogAgentEntry {
    pub credits: u32,
    #[serde(default)]
    pub transforming: bool,
    #[serde(default)]
    pub description: String,
}
