//! System prompt assembly for code generation.

use modelsmith_sandbox::{CapabilityDescription, CodeSandbox, SandboxError};

/// Builds the system prompt from the approved capabilities.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    capabilities: Vec<CapabilityDescription>,
    additional_instructions: Option<String>,
}

impl PromptBuilder {
    pub fn new(capabilities: Vec<CapabilityDescription>) -> Self {
        Self {
            capabilities,
            additional_instructions: None,
        }
    }

    /// Describe the capabilities a sandbox would expose to generated code.
    pub fn from_sandbox(sandbox: &CodeSandbox) -> Result<Self, SandboxError> {
        Ok(Self::new(sandbox.capability_descriptions()?))
    }

    /// Append free-form instructions; blank text is ignored.
    pub fn with_additional_instructions(mut self, instructions: Option<&str>) -> Self {
        self.additional_instructions = instructions
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        self
    }

    pub fn capabilities(&self) -> &[CapabilityDescription] {
        &self.capabilities
    }

    pub fn build(&self) -> String {
        let mut sections = vec![
            build_header_section(),
            build_capability_section(&self.capabilities),
            build_language_section(),
        ];
        if let Some(instructions) = &self.additional_instructions {
            sections.push(format!("## Additional Instructions\n\n{instructions}"));
        }
        sections.join("\n\n---\n\n")
    }
}

fn build_header_section() -> String {
    "# CAD Script Author\n\n\
You are an expert in parametric CAD modeling and structural design. You turn a \
modeling request into a single script that builds the model in the active document.\n\n\
RULES:\n\
- Use only the capabilities listed below; nothing else is reachable.\n\
- All dimensions are millimetres.\n\
- Model standard parts (fasteners, profiles, flanges) to the dimensions of the applicable standard.\n\
- Give every object a short descriptive label.\n\
- Do not access files, processes, or the network.\n\
- Scripts whose text contains the word \"socket\" anywhere, labels included, are rejected. \
Label socket head screws as \"cap screw\" or \"hex drive screw\".\n\
- Reply with the script only: no prose, no explanations."
        .to_string()
}

fn build_capability_section(capabilities: &[CapabilityDescription]) -> String {
    if capabilities.is_empty() {
        return "## Capabilities\n\nNo capabilities are available.".to_string();
    }
    let lines = capabilities
        .iter()
        .map(|capability| format!("- `{}`: {}", capability.name, capability.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!("## Capabilities\n\n{lines}")
}

fn build_language_section() -> String {
    "## Script Language\n\n\
Scripts are Rhai. Declare variables with `let`, call namespace functions with \
`Namespace::function(..)` and methods with `value.method(..)`. Integers and \
floats are both accepted as dimensions. Use `print(..)` to report results. \
`eval`, `import`, and function pointers are unavailable."
        .to_string()
}
