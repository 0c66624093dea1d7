//! Check-and-run gate in front of the execution lifecycle.

use crate::SandboxError;
use crate::environment::{self, CapabilityEnvironmentBuilder, ExecutionLimits};
use crate::host::CadHost;
use crate::lifecycle::ExecutionLifecycle;
use crate::policy::PolicyRuleSet;
use log::{debug, info};
use modelsmith_config::ModelsmithConfig;
use modelsmith_protocol::{ExecutionResult, PolicyVerdict, PolicyViolation, RunOutcome};
use parking_lot::Mutex;
use rhai::ParseError;
use std::sync::Arc;

/// Name and description of an approved capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescription {
    pub name: String,
    pub description: String,
}

/// Policy check plus sandboxed execution against one host.
///
/// Attempts are serialized: a second attempt while one is running fails
/// with [`SandboxError::Busy`] rather than queueing.
pub struct CodeSandbox {
    host: Arc<dyn CadHost>,
    rules: PolicyRuleSet,
    builder: CapabilityEnvironmentBuilder,
    workspace_prefix: String,
    max_code_bytes: Option<usize>,
    in_flight: Mutex<()>,
}

impl CodeSandbox {
    pub fn new(host: Arc<dyn CadHost>, config: &ModelsmithConfig) -> Result<Self, SandboxError> {
        config
            .validate()
            .map_err(|err| SandboxError::InvalidConfig(err.to_string()))?;
        let rules = PolicyRuleSet::builtin().with_extra_rules(&config.policy.extra_rules)?;
        let builder = CapabilityEnvironmentBuilder::new(
            config.capabilities.approved.clone(),
            ExecutionLimits::from(&config.execution),
        );
        info!(
            "code sandbox ready (rules={}, capabilities={:?}, max_code_bytes={:?})",
            rules.len(),
            builder.approved(),
            config.policy.max_code_bytes
        );
        Ok(Self {
            host,
            rules,
            builder,
            workspace_prefix: config.execution.workspace_prefix.clone(),
            max_code_bytes: config.policy.max_code_bytes,
            in_flight: Mutex::new(()),
        })
    }

    pub fn host(&self) -> &Arc<dyn CadHost> {
        &self.host
    }

    pub fn rules(&self) -> &PolicyRuleSet {
        &self.rules
    }

    pub fn approved_capabilities(&self) -> &[String] {
        self.builder.approved()
    }

    /// Describe every approved capability as the host reports it.
    pub fn capability_descriptions(&self) -> Result<Vec<CapabilityDescription>, SandboxError> {
        self.builder
            .approved()
            .iter()
            .map(|name| {
                self.host
                    .capability(name)
                    .map(|capability| CapabilityDescription {
                        name: capability.name,
                        description: capability.description,
                    })
                    .ok_or_else(|| SandboxError::CapabilityUnavailable(name.clone()))
            })
            .collect()
    }

    pub fn check(&self, code: &str) -> PolicyVerdict {
        self.rules.check(code)
    }

    pub fn violations(&self, code: &str) -> Vec<PolicyViolation> {
        self.rules.violations(code)
    }

    /// Parse `code` with the execution grammar without running it.
    pub fn check_syntax(&self, code: &str) -> Result<(), ParseError> {
        environment::parse_only(code, self.builder.limits())
    }

    /// Run code without a policy check. Callers are expected to have checked it.
    pub fn run(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        self.ensure_size(code)?;
        self.execute(code)
    }

    /// The single entry point: deny without running, or run and report.
    pub fn check_and_run(&self, code: &str) -> Result<RunOutcome, SandboxError> {
        self.ensure_size(code)?;
        if let PolicyVerdict::Denied(violation) = self.check(code) {
            return Ok(RunOutcome::Denied(violation));
        }
        let result = self.execute(code)?;
        Ok(RunOutcome::Completed(result))
    }

    fn execute(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        let _guard = self.in_flight.try_lock().ok_or(SandboxError::Busy)?;
        ExecutionLifecycle::new(self.host.as_ref(), &self.builder, &self.workspace_prefix).run(code)
    }

    fn ensure_size(&self, code: &str) -> Result<(), SandboxError> {
        match self.max_code_bytes {
            Some(limit) if code.len() > limit => {
                debug!(
                    "code rejected for size (size={}, limit={})",
                    code.len(),
                    limit
                );
                Err(SandboxError::CodeTooLarge {
                    size: code.len(),
                    limit,
                })
            }
            _ => Ok(()),
        }
    }
}
