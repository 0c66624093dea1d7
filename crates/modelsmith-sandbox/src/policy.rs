//! Static policy check over generated code text.
//!
//! The rule table is a conservative, syntax-unaware filter: patterns match
//! case-insensitively anywhere in the raw text. False positives are
//! acceptable, false negatives are not. It is trivially evadable (string
//! concatenation, alternate spellings, host APIs not listed here) and is a
//! defense-in-depth layer in front of the restricted environment, not a proof
//! of safety.

use crate::SandboxError;
use log::{debug, info};
use modelsmith_config::PolicyRuleConfig;
use modelsmith_protocol::PolicyCategory::{
    FileSystem, Network, ProcessControl, Reflection, SelfReference,
};
use modelsmith_protocol::{PolicyCategory, PolicyVerdict, PolicyViolation};
use regex::{Regex, RegexBuilder};

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Builtin,
    Config,
}

/// A compiled forbidden-capability matcher.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub id: String,
    pub category: PolicyCategory,
    pub pattern: Regex,
    pub source: RuleSource,
}

impl PolicyRule {
    /// Compile a case-insensitive rule.
    pub fn new(
        id: impl Into<String>,
        category: PolicyCategory,
        pattern: &str,
        source: RuleSource,
    ) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            id: id.into(),
            category,
            pattern,
            source,
        })
    }

    fn violation(&self, code: &str) -> Option<PolicyViolation> {
        self.pattern.find(code).map(|found| PolicyViolation {
            rule_id: self.id.clone(),
            category: self.category,
            pattern: self.pattern.as_str().to_string(),
            matched_text: found.as_str().to_string(),
        })
    }
}

/// Builtin rules in reporting order.
const BUILTIN_RULES: &[(&str, PolicyCategory, &str)] = &[
    // File-system mutation.
    (
        "fs-os-mutation",
        FileSystem,
        r"os\s*\.\s*(remove|unlink|rmdir|removedirs|makedirs|mkdir|rename|replace|chmod|chown)\s*\(",
    ),
    (
        "fs-file-ops",
        FileSystem,
        r"remove_?file|remove_?dir|create_?dir|write_?file|read_?file|read_?to_?string|delete_?file",
    ),
    ("fs-shutil", FileSystem, r"shutil\s*\."),
    ("fs-path-modules", FileSystem, r"pathlib|\bstd\s*::\s*fs\b"),
    // Process and OS control.
    ("proc-subprocess", ProcessControl, r"subprocess"),
    (
        "proc-os-exec",
        ProcessControl,
        r"os\s*\.\s*(system|popen|fork|exec\w*|spawn\w*|kill)\s*\(",
    ),
    ("proc-legacy-popen", ProcessControl, r"popen2\s*\.|commands\s*\."),
    ("proc-command", ProcessControl, r"std\s*::\s*process|Command\s*::\s*new"),
    ("proc-exit", ProcessControl, r"(sys\s*\.\s*)?exit\s*\(|quit\s*\("),
    // Network clients.
    (
        "net-requests",
        Network,
        r"requests\s*\.\s*(get|post|put|patch|delete|head|request|session)\s*\(",
    ),
    ("net-urllib", Network, r"urllib"),
    ("net-http-client", Network, r"http\s*\.\s*client"),
    ("net-socket", Network, r"socket\s*\.|\bsocket\b"),
    ("net-ftp", Network, r"ftplib"),
    ("net-async-http", Network, r"\bhttpx\b|\baiohttp\b|\breqwest\b"),
    ("net-url", Network, r"\bhttps?://"),
    // Dynamic evaluation, dynamic import and reflection.
    ("dyn-eval", Reflection, r"eval\s*\("),
    ("dyn-exec", Reflection, r"exec\s*\("),
    ("dyn-compile", Reflection, r"compile\s*\("),
    ("dyn-import-builtin", Reflection, r"__import__|importlib"),
    ("dyn-scope-tables", Reflection, r"(globals|locals|vars)\s*\("),
    ("dyn-attr", Reflection, r"(get|set|del|has)attr\s*\("),
    ("dyn-builtins", Reflection, r"builtins"),
    ("dyn-module-table", Reflection, r"sys\s*\.\s*modules"),
    (
        "dyn-dunder",
        Reflection,
        r"__dict__|__class__|__subclasses__|__globals__|__code__",
    ),
    ("dyn-fn-ptr", Reflection, r"\bFn\s*\(|\bcurry\s*\(|\bis_def_(var|fn)\s*\("),
    ("dyn-script-import", Reflection, r#"\bimport\s*["']"#),
    // Calls back into a code-generation service.
    (
        "self-genai",
        SelfReference,
        r"google\s*\.\s*generativeai|\bgenai\b|generativelanguage\.googleapis",
    ),
    ("self-llm-sdk", SelfReference, r"\bopenai\b|\banthropic\b"),
    ("self-generate", SelfReference, r"generate_?content|\bgenerate_code\s*\("),
    // Bare file-handle calls. These also match `popen(` and `urlopen(`, so
    // they sit last.
    ("fs-open", FileSystem, r"open\s*\("),
    ("fs-file-handle", FileSystem, r"file\s*\("),
];

/// Ordered, immutable set of policy rules.
#[derive(Debug, Clone)]
pub struct PolicyRuleSet {
    rules: Vec<PolicyRule>,
}

impl PolicyRuleSet {
    /// The default rule table.
    pub fn builtin() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .map(|(id, category, pattern)| {
                PolicyRule::new(*id, *category, pattern, RuleSource::Builtin)
                    .expect("builtin policy pattern compiles")
            })
            .collect();
        Self { rules }
    }

    /// Append integrator rules after the builtin ones. Config can add rules,
    /// never remove them.
    pub fn with_extra_rules(mut self, extra: &[PolicyRuleConfig]) -> Result<Self, SandboxError> {
        for spec in extra {
            if self.rules.iter().any(|rule| rule.id == spec.id) {
                return Err(SandboxError::InvalidConfig(format!(
                    "policy rule id already defined: {}",
                    spec.id
                )));
            }
            let rule = PolicyRule::new(&spec.id, spec.category, &spec.pattern, RuleSource::Config)
                .map_err(|err| {
                    SandboxError::InvalidConfig(format!("policy rule {}: {err}", spec.id))
                })?;
            self.rules.push(rule);
        }
        debug!(
            "policy rules assembled (total={}, extra={})",
            self.rules.len(),
            extra.len()
        );
        Ok(self)
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Denied with the first matching rule, Allowed when none match.
    pub fn check(&self, code: &str) -> PolicyVerdict {
        match self.rules.iter().find_map(|rule| rule.violation(code)) {
            Some(violation) => {
                info!(
                    "policy check denied (rule={}, category={})",
                    violation.rule_id, violation.category
                );
                PolicyVerdict::Denied(violation)
            }
            None => {
                debug!("policy check allowed (len={})", code.len());
                PolicyVerdict::Allowed
            }
        }
    }

    /// Every matching rule, in rule order.
    pub fn violations(&self, code: &str) -> Vec<PolicyViolation> {
        self.rules
            .iter()
            .filter_map(|rule| rule.violation(code))
            .collect()
    }
}

impl Default for PolicyRuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_patterns_compile() {
        let rules = PolicyRuleSet::builtin();
        assert_eq!(rules.len(), BUILTIN_RULES.len());
    }

    #[test]
    fn builtin_covers_every_category() {
        let rules = PolicyRuleSet::builtin();
        for category in PolicyCategory::ALL {
            assert!(
                rules.rules().iter().any(|rule| rule.category == category),
                "{category}"
            );
        }
    }

    #[test]
    fn builtin_ids_are_unique() {
        let mut ids: Vec<_> = BUILTIN_RULES.iter().map(|(id, _, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), BUILTIN_RULES.len());
    }

    #[test]
    fn matching_ignores_case() {
        let verdict = PolicyRuleSet::builtin().check("import SUBPROCESS");
        assert_eq!(
            verdict.violation().map(|v| v.category),
            Some(PolicyCategory::ProcessControl)
        );
    }

    #[test]
    fn first_rule_in_order_is_reported() {
        let rules = PolicyRuleSet::builtin();
        let code = "open('x'); os.system('rm')";
        let verdict = rules.check(code);
        assert_eq!(
            verdict.violation().map(|v| v.rule_id.as_str()),
            Some("proc-os-exec")
        );
        let ids: Vec<_> = rules
            .violations(code)
            .into_iter()
            .map(|v| v.rule_id)
            .collect();
        assert_eq!(ids, vec!["proc-os-exec".to_string(), "fs-open".to_string()]);
    }

    #[test]
    fn underscored_and_prefixed_names_are_denied() {
        let rules = PolicyRuleSet::builtin();
        for (code, id) in [
            ("os._exit(0)", "proc-exit"),
            ("os.fdopen(3, 'w')", "fs-open"),
            ("tempfile.NamedTemporaryFile()", "fs-file-handle"),
            ("_socket.socket()", "net-socket"),
        ] {
            assert_eq!(
                rules.check(code).violation().map(|v| v.rule_id.as_str()),
                Some(id),
                "{code}"
            );
        }
    }

    #[test]
    fn extra_rule_with_bad_pattern_is_rejected() {
        let extra = [PolicyRuleConfig {
            id: "broken".to_string(),
            category: PolicyCategory::Network,
            pattern: "(unclosed".to_string(),
        }];
        let err = PolicyRuleSet::builtin().with_extra_rules(&extra).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidConfig(_)));
    }

    #[test]
    fn extra_rule_cannot_shadow_builtin_id() {
        let extra = [PolicyRuleConfig {
            id: "fs-open".to_string(),
            category: PolicyCategory::FileSystem,
            pattern: "nothing".to_string(),
        }];
        assert!(PolicyRuleSet::builtin().with_extra_rules(&extra).is_err());
    }
}
