//! Governance configuration: modes, tools, model constraints, safety.
//!
//! Loaded once at startup from four namespaced YAML documents. Validation is
//! strict — any invalid document fails startup with a path-qualified error
//! list. The resulting [`GovernanceConfig`] is immutable after load.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mode::Mode;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Modes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One mode as declared in `modes.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeDefinition {
    #[serde(default)]
    pub description: String,
    /// Metric thresholds associated with the mode (`metric_id → value`).
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

/// Comparison operator in a transition condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
            Comparator::Gt => value > threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

/// A single condition inside a transition rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionCondition {
    pub metric: String,
    pub op: Comparator,
    pub threshold: f64,
}

impl TransitionCondition {
    /// True when the sensor map contains the metric and it satisfies the
    /// comparison. A missing metric never satisfies a condition.
    pub fn is_satisfied(&self, sensors: &BTreeMap<String, f64>) -> bool {
        sensors
            .get(&self.metric)
            .is_some_and(|value| self.op.evaluate(*value, self.threshold))
    }
}

/// A mode transition rule. All conditions are AND-ed; the first matching
/// rule wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: Mode,
    pub to: Mode,
    #[serde(default)]
    pub conditions: Vec<TransitionCondition>,
    pub reason: String,
}

impl TransitionRule {
    pub fn matches(&self, current: Mode, sensors: &BTreeMap<String, f64>) -> bool {
        self.from == current && self.conditions.iter().all(|c| c.is_satisfied(sensors))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool category declared in `tools.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCategory {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_risk_level: Option<crate::tool::RiskLevel>,
}

/// Per-tool governance policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolPolicy {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub allowed_in_modes: Vec<String>,
    /// Glob patterns a `path` argument must NOT match. `$HOME` is expanded.
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
    /// Glob patterns a `path` argument MUST match (when non-empty).
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requires_sandbox: bool,
    #[serde(default)]
    pub rate_limit_per_hour: Option<u32>,
    /// Replacement description for the model-facing descriptor.
    #[serde(default)]
    pub description_override: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model constraints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-mode model-role constraints from `models.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModeModelConstraints {
    /// Roles permitted in this mode; empty means all.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub max_context_tokens: Option<u32>,
    /// When true, tools are withheld from the model in this mode.
    #[serde(default)]
    pub disable_tools: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentFiltering {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPattern {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutboundGateway {
    #[serde(default)]
    pub allow_domains: Vec<String>,
    #[serde(default)]
    pub deny_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateLimits {
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub tool_calls_per_minute: Option<u32>,
}

/// One human-approval rule; any matching rule forces approval.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HumanApprovalRule {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub risk_level: Option<crate::tool::RiskLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HumanApproval {
    #[serde(default)]
    pub rules: Vec<HumanApprovalRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SafetyConfig {
    #[serde(default)]
    pub content_filtering: ContentFiltering,
    #[serde(default)]
    pub secret_patterns: Vec<SecretPattern>,
    #[serde(default)]
    pub outbound_gateway: OutboundGateway,
    #[serde(default)]
    pub rate_limits: RateLimits,
    #[serde(default)]
    pub human_approval: HumanApproval,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GovernanceConfig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The validated union of the four governance documents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub modes: BTreeMap<String, ModeDefinition>,
    #[serde(default)]
    pub transition_rules: Vec<TransitionRule>,
    #[serde(default)]
    pub tool_categories: BTreeMap<String, ToolCategory>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolPolicy>,
    #[serde(default)]
    pub mode_constraints: BTreeMap<String, ModeModelConstraints>,
    #[serde(default)]
    pub safety: SafetyConfig,
}

impl GovernanceConfig {
    /// Governance policy for a tool, if declared.
    pub fn tool_policy(&self, name: &str) -> Option<&ToolPolicy> {
        self.tools.get(name)
    }

    /// Model constraints for a mode, if declared.
    pub fn constraints_for(&self, mode: Mode) -> Option<&ModeModelConstraints> {
        self.mode_constraints.get(mode.as_str())
    }

    /// Whether any human-approval rule matches the given tool context.
    pub fn approval_demanded(
        &self,
        mode: Mode,
        category: &str,
        risk: crate::tool::RiskLevel,
    ) -> bool {
        self.safety.human_approval.rules.iter().any(|rule| {
            let mode_hit = rule
                .mode
                .as_deref()
                .map_or(true, |m| m.eq_ignore_ascii_case(mode.as_str()));
            let cat_hit = rule.category.as_deref().map_or(true, |c| c == category);
            let risk_hit = rule.risk_level.map_or(true, |r| r == risk);
            // A rule with no fields at all would force approval everywhere;
            // require at least one field to be set.
            let has_field =
                rule.mode.is_some() || rule.category.is_some() || rule.risk_level.is_some();
            has_field && mode_hit && cat_hit && risk_hit
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, Default)]
struct ModesDoc {
    #[serde(default)]
    modes: BTreeMap<String, ModeDefinition>,
    #[serde(default)]
    transition_rules: Vec<TransitionRule>,
}

#[derive(Debug, Deserialize, Default)]
struct ToolsDoc {
    #[serde(default)]
    tool_categories: BTreeMap<String, ToolCategory>,
    #[serde(default)]
    tools: BTreeMap<String, ToolPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelsDoc {
    #[serde(default)]
    mode_constraints: BTreeMap<String, ModeModelConstraints>,
}

/// Load and validate the governance configuration from a directory holding
/// `modes.yaml`, `tools.yaml`, `models.yaml`, and `safety.yaml`.
///
/// All problems are collected into a single path-qualified error list so one
/// startup attempt reports everything at once.
pub fn load_governance(dir: &Path) -> Result<GovernanceConfig> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "governance config directory does not exist: {}",
            dir.display()
        )));
    }

    let mut errors: Vec<String> = Vec::new();

    let modes_doc: ModesDoc = load_doc(dir, "modes.yaml", &mut errors);
    let tools_doc: ToolsDoc = load_doc(dir, "tools.yaml", &mut errors);
    let models_doc: ModelsDoc = load_doc(dir, "models.yaml", &mut errors);
    let safety: SafetyConfig = load_doc(dir, "safety.yaml", &mut errors);

    validate_modes(&modes_doc, &mut errors);
    validate_tools(&tools_doc, &mut errors);

    if !errors.is_empty() {
        return Err(Error::Config(format!(
            "governance configuration validation failed:\n{}",
            errors.join("\n")
        )));
    }

    let config = GovernanceConfig {
        modes: modes_doc.modes,
        transition_rules: modes_doc.transition_rules,
        tool_categories: tools_doc.tool_categories,
        tools: tools_doc.tools,
        mode_constraints: models_doc.mode_constraints,
        safety,
    };

    tracing::info!(
        modes = config.modes.len(),
        tools = config.tools.len(),
        transition_rules = config.transition_rules.len(),
        "governance config loaded"
    );

    Ok(config)
}

fn load_doc<T: serde::de::DeserializeOwned + Default>(
    dir: &Path,
    file: &str,
    errors: &mut Vec<String>,
) -> T {
    let path = dir.join(file);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            errors.push(format!("{file}: {e}"));
            return T::default();
        }
    };
    match serde_yaml::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            errors.push(format!("{file}: {e}"));
            T::default()
        }
    }
}

fn validate_modes(doc: &ModesDoc, errors: &mut Vec<String>) {
    for (name, _) in &doc.modes {
        if Mode::from_str(name).is_none() {
            errors.push(format!("modes.yaml: modes.{name}: unknown mode name"));
        }
    }
    for (i, rule) in doc.transition_rules.iter().enumerate() {
        if rule.from == rule.to {
            errors.push(format!(
                "modes.yaml: transition_rules[{i}]: self transition {} -> {} is forbidden",
                rule.from, rule.to
            ));
        }
        if rule.reason.trim().is_empty() {
            errors.push(format!("modes.yaml: transition_rules[{i}]: reason is empty"));
        }
    }
}

fn validate_tools(doc: &ToolsDoc, errors: &mut Vec<String>) {
    for (name, policy) in &doc.tools {
        for mode in &policy.allowed_in_modes {
            if Mode::from_str(mode).is_none() {
                errors.push(format!(
                    "tools.yaml: tools.{name}.allowed_in_modes: unknown mode {mode:?}"
                ));
            }
        }
        if !policy.category.is_empty() && !doc.tool_categories.contains_key(&policy.category) {
            errors.push(format!(
                "tools.yaml: tools.{name}.category: undeclared category {:?}",
                policy.category
            ));
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
