//! Per-pipeline configuration.

/// Default bound on reflection-requested retrieval cycles.
pub const MAX_CYCLES: u32 = 2;

/// Configuration of one agent pipeline: what domain it answers for, how many
/// documents each retrieval call asks for, and how many extra retrieval
/// cycles reflection may request.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    /// Workflow name, used in logs and traces.
    pub name: String,
    /// Human-readable description of the knowledge domain, interpolated into
    /// prompts.
    pub domain_label: String,
    /// Documents requested per retrieval call.
    pub retrieval_k: usize,
    /// Ceiling on reflection-requested retrieval cycles.
    pub max_cycles: u32,
    /// System prompt for answer generation.
    pub system_prompt: String,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, domain_label: impl Into<String>) -> Self {
        let domain_label = domain_label.into();
        Self {
            name: name.into(),
            system_prompt: format!(
                "You are a helpful assistant answering questions about {domain_label}. \
                 Answer in the user's language."
            ),
            domain_label,
            retrieval_k: 2,
            max_cycles: MAX_CYCLES,
        }
    }

    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k;
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Profile of the company-policy agent.
    pub fn policy() -> Self {
        Self::new("policy-agent", "company HR policies")
    }

    /// Profile of the scripture agent. Its corpus is dense, so each query
    /// pulls a wider net of passages.
    pub fn scripture() -> Self {
        Self::new(
            "scripture-agent",
            "Orthodox Christian scripture and tradition",
        )
        .with_retrieval_k(10)
    }

    /// Profile of the retail-analytics agent.
    pub fn analytics() -> Self {
        Self::new("analytics-agent", "retail sales analytics")
    }
}
