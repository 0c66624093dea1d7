//! Capability environment construction.
//!
//! An environment is the complete namespace a script runs in: the approved
//! host capabilities plus an explicitly enumerated set of base operations.
//! Every build starts from empty state, so nothing produced for one attempt
//! is visible to the next.

use crate::SandboxError;
use crate::host::{CadHost, Capability, CapabilityKind};
use log::{debug, info};
use modelsmith_config::ExecutionConfig;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicIteratorPackage, BasicMapPackage,
    BasicMathPackage, BasicStringPackage, LogicPackage, MoreStringPackage, Package,
};
use rhai::{Dynamic, Engine, EvalAltResult, Module, ParseError, Scope, Shared};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Keywords removed from the language: dynamic evaluation, function-pointer
/// reflection and module import/export.
pub const DISABLED_SYMBOLS: &[&str] = &[
    "eval",
    "Fn",
    "call",
    "curry",
    "is_def_var",
    "is_def_fn",
    "import",
    "export",
];

/// Budget applied to every script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Operation budget; `None` is unbounded.
    pub max_operations: Option<u64>,
    /// Wall-clock budget; `None` is unbounded.
    pub timeout: Option<Duration>,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl From<&ExecutionConfig> for ExecutionLimits {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_operations: config.max_operations,
            timeout: config.timeout_ms.map(Duration::from_millis),
            max_call_levels: config.max_call_levels,
            max_expr_depth: config.max_expr_depth,
            max_string_size: config.max_string_size,
            max_array_size: config.max_array_size,
            max_map_size: config.max_map_size,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

/// Bare engine with no packages, no module resolution and the reflective
/// symbols disabled.
fn restricted_engine() -> Engine {
    let mut engine = Engine::new_raw();
    engine.set_module_resolver(DummyModuleResolver::new());
    for symbol in DISABLED_SYMBOLS {
        engine.disable_symbol(*symbol);
    }
    engine
}

/// Parse `code` without running it or touching any host.
pub fn parse_only(code: &str, limits: &ExecutionLimits) -> Result<(), ParseError> {
    let mut engine = restricted_engine();
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.compile(code).map(|_| ())
}

/// The allowlisted base operation sets, freshly instantiated.
fn base_operations() -> BTreeMap<&'static str, Shared<Module>> {
    BTreeMap::from([
        ("arithmetic", ArithmeticPackage::new().as_shared_module()),
        ("logic", LogicPackage::new().as_shared_module()),
        ("math", BasicMathPackage::new().as_shared_module()),
        ("string", BasicStringPackage::new().as_shared_module()),
        ("string_more", MoreStringPackage::new().as_shared_module()),
        ("array", BasicArrayPackage::new().as_shared_module()),
        ("map", BasicMapPackage::new().as_shared_module()),
        ("iterator", BasicIteratorPackage::new().as_shared_module()),
    ])
}

/// Builds a fresh [`CapabilityEnvironment`] per execution attempt.
#[derive(Debug, Clone)]
pub struct CapabilityEnvironmentBuilder {
    approved: Vec<String>,
    limits: ExecutionLimits,
}

impl CapabilityEnvironmentBuilder {
    pub fn new(approved: Vec<String>, limits: ExecutionLimits) -> Self {
        Self { approved, limits }
    }

    pub fn approved(&self) -> &[String] {
        &self.approved
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Fetch every approved capability from the host.
    ///
    /// A capability the host does not provide fails the build instead of
    /// being dropped, so a misconfigured deployment is distinguishable from
    /// an intentionally withheld capability.
    pub fn build(&self, host: &dyn CadHost) -> Result<CapabilityEnvironment, SandboxError> {
        let mut seen = BTreeSet::new();
        let mut capabilities = BTreeMap::new();
        let mut scope = Scope::new();

        for name in &self.approved {
            if !seen.insert(name.as_str()) {
                return Err(SandboxError::InvalidConfig(format!(
                    "capability approved twice: {name}"
                )));
            }
            let capability = host
                .capability(name)
                .ok_or_else(|| SandboxError::CapabilityUnavailable(name.clone()))?;
            if let CapabilityKind::Object { value, .. } = &capability.kind {
                scope.push_constant_dynamic(name.clone(), value.clone());
            }
            capabilities.insert(name.clone(), capability);
        }

        let base_operations = base_operations();
        debug!(
            "capability environment built (capabilities={}, base_operations={})",
            capabilities.len(),
            base_operations.len()
        );
        Ok(CapabilityEnvironment {
            capabilities,
            base_operations,
            scope,
            limits: self.limits.clone(),
        })
    }
}

/// Namespace for one execution attempt.
pub struct CapabilityEnvironment {
    capabilities: BTreeMap<String, Capability>,
    base_operations: BTreeMap<&'static str, Shared<Module>>,
    scope: Scope<'static>,
    limits: ExecutionLimits,
}

impl CapabilityEnvironment {
    pub fn capability_names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    pub fn base_operation_names(&self) -> Vec<&'static str> {
        self.base_operations.keys().copied().collect()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.get(name)
    }

    pub fn base_operation(&self, name: &str) -> Option<&Shared<Module>> {
        self.base_operations.get(name)
    }

    /// Variables visible to the script before it runs.
    pub fn scope(&self) -> &Scope<'static> {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope<'static> {
        &mut self.scope
    }

    /// Assemble an engine that sees only this environment.
    pub fn into_runtime(self) -> ScriptRuntime {
        let mut engine = restricted_engine();

        for module in self.base_operations.into_values() {
            engine.register_global_module(module);
        }
        for (name, capability) in self.capabilities {
            match capability.kind {
                CapabilityKind::Object { methods, .. } => {
                    engine.register_global_module(methods);
                }
                CapabilityKind::Namespace { module, methods } => {
                    engine.register_static_module(name.as_str(), module);
                    engine.register_global_module(methods);
                }
            }
        }

        let limits = self.limits;
        engine.set_max_operations(limits.max_operations.unwrap_or(0));
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        let started = Rc::new(Cell::new(None::<Instant>));
        if let Some(timeout) = limits.timeout {
            let started = started.clone();
            engine.on_progress(move |_operations| {
                let elapsed = started.get().map(|start| start.elapsed())?;
                (elapsed > timeout).then(|| {
                    Dynamic::from(format!(
                        "wall-clock budget of {} ms exceeded",
                        timeout.as_millis()
                    ))
                })
            });
        }

        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = output.clone();
        engine.on_print(move |text| {
            info!("script print (text={})", text);
            sink.borrow_mut().push(text.to_string());
        });
        let sink = output.clone();
        engine.on_debug(move |text, _source, position| {
            debug!("script debug (text={}, position={})", text, position);
            sink.borrow_mut().push(text.to_string());
        });

        ScriptRuntime {
            engine,
            scope: self.scope,
            output,
            started,
        }
    }
}

/// An engine bound to one environment, ready to run code once.
pub struct ScriptRuntime {
    engine: Engine,
    scope: Scope<'static>,
    output: Rc<RefCell<Vec<String>>>,
    started: Rc<Cell<Option<Instant>>>,
}

impl ScriptRuntime {
    /// Compile and run `code` with the environment as its sole namespace.
    pub fn run(&mut self, code: &str) -> Result<(), Box<EvalAltResult>> {
        self.started.set(Some(Instant::now()));
        let ast = self.engine.compile(code)?;
        self.engine.run_ast_with_scope(&mut self.scope, &ast)
    }

    /// Lines printed by the script so far.
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }
}
