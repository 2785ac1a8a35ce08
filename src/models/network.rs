// Network resource spec: multi-agent orchestration under a router.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub model: String,
    #[serde(rename = "maxSteps", default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_max_steps() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStateConfig {
    #[serde(default)]
    pub persistence: bool,
    /// TTL in milliseconds. Expiry is soft: state past its TTL is treated
    /// as absent on read but isn't proactively swept.
    #[serde(default)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub instructions: String,
    pub agents: Vec<AgentEntry>,
    pub router: RouterConfig,
    #[serde(default)]
    pub state: Option<NetworkStateConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_network_with_agents() {
        let yaml = r#"
instructions: "Route support tickets"
agents:
  - name: technical
    ref: Agent/technical-agent
    specialties: [hardware, software]
  - name: billing
    ref: Agent/billing-agent
    specialties: [payment, refund]
router:
  model: openai/gpt-4
  maxSteps: 5
"#;
        let spec: NetworkSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.agents.len(), 2);
        assert_eq!(spec.router.max_steps, 5);
    }
}
