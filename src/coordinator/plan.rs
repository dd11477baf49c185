//! Plan model: a festival of ordered sequences, each an ordered list of tasks.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoordinatorError, Result, ResultExt};

/// Immutable description of the work to hand out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub festival_id: String,
    #[serde(default)]
    pub sequences: Vec<PlanSequence>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSequence {
    pub id: String,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
}

/// One unit of work. Everything past `assign_to` is passed through to agents
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanTask {
    pub id: String,
    pub name: String,
    /// Explicit assignee. Empty means round-robin.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub assign_to: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Payment hint; the result handler pays its configured default.
    #[serde(skip_serializing_if = "is_zero")]
    pub payment_amount: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub task_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input: String,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub priority: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub max_tokens: i32,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

impl Plan {
    /// Total tasks across all sequences.
    pub fn task_count(&self) -> usize {
        self.sequences.iter().map(|seq| seq.tasks.len()).sum()
    }

    pub fn task_by_id(&self, task_id: &str) -> Option<&PlanTask> {
        self.tasks().find(|task| task.id == task_id)
    }

    /// Tasks in plan order: sequences first, then tasks within each.
    pub fn tasks(&self) -> impl Iterator<Item = &PlanTask> {
        self.sequences.iter().flat_map(|seq| seq.tasks.iter())
    }

    /// Structural checks: non-empty ids and no duplicate task ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (seq_idx, seq) in self.sequences.iter().enumerate() {
            if seq.id.is_empty() {
                return Err(CoordinatorError::Validation(format!(
                    "plan {}: sequence #{} has an empty id",
                    self.festival_id,
                    seq_idx + 1
                )));
            }
            for task in &seq.tasks {
                if task.id.is_empty() {
                    return Err(CoordinatorError::Validation(format!(
                        "plan {}: sequence {} has a task with an empty id",
                        self.festival_id, seq.id
                    )));
                }
                if !seen.insert(task.id.as_str()) {
                    return Err(CoordinatorError::Validation(format!(
                        "plan {}: duplicate task id {}",
                        self.festival_id, task.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(raw).context_with(|| "parse plan")?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .context_with(|| format!("read plan {}", path.display()))?;
        Self::from_json_str(&raw).context_with(|| format!("load plan {}", path.display()))
    }
}

/// Built-in plan for the two-agent integration cycle: an inference task, then a
/// trade that depends on it.
pub fn integration_cycle_plan(inference_agent_id: &str, defi_agent_id: &str) -> Plan {
    Plan {
        festival_id: "integration-cycle-001".to_string(),
        sequences: vec![PlanSequence {
            id: "seq-01".to_string(),
            tasks: vec![
                PlanTask {
                    id: "task-inference-01".to_string(),
                    name: "market_sentiment_analysis".to_string(),
                    assign_to: inference_agent_id.to_string(),
                    model_id: "test-model".to_string(),
                    input: "Analyze market sentiment for ETH".to_string(),
                    priority: 1,
                    max_tokens: 512,
                    payment_amount: 100,
                    ..Default::default()
                },
                PlanTask {
                    id: "task-defi-01".to_string(),
                    name: "execute_trade".to_string(),
                    task_type: "execute_trade".to_string(),
                    assign_to: defi_agent_id.to_string(),
                    priority: 1,
                    payment_amount: 100,
                    dependencies: vec!["task-inference-01".to_string()],
                    ..Default::default()
                },
            ],
        }],
    }
}
