use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool registry capability wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which external collaborators are actually wired up. A tool whose
/// capability is `false` here still appears in the registry (so the
/// model can learn about it) but reports `capability_unavailable`
/// instead of executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub data_sandbox: DataSandboxConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_search: WebSearchConfig::default(),
            vision: VisionConfig::default(),
            data_sandbox: DataSandboxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_web_search_key_env")]
    pub api_key_env: String,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: d_web_search_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Sandboxed `analyze_data` execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSandboxConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Max rows returned by a single `analyze_data` call.
    #[serde(default = "d_row_cap")]
    pub row_cap: usize,
    /// Tokens that immediately fail generated code with `unsafe_operation`
    /// if present: imports, filesystem writes, shell escapes, attribute
    /// access that could reach outside the restricted scope.
    #[serde(default = "d_denylist")]
    pub denylist: Vec<String>,
}

impl Default for DataSandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            row_cap: d_row_cap(),
            denylist: d_denylist(),
        }
    }
}

fn d_web_search_key_env() -> String {
    "CORTEX_WEB_SEARCH_API_KEY".into()
}
fn d_row_cap() -> usize {
    500
}
fn d_denylist() -> Vec<String> {
    vec![
        r"\bimport\b".into(),
        r"\bopen\s*\(".into(),
        r"\bos\.".into(),
        r"\bsubprocess\b".into(),
        r"__[a-zA-Z_]+__".into(),
        r"\beval\s*\(".into(),
        r"\bexec\s*\(".into(),
    ]
}
