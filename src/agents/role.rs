use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const BASE_TOOLS: &[&str] = &["Read", "Write", "Edit", "Bash", "Glob", "Grep"];
const PROJECT_MANAGER_EXTRA: &[&str] = &["WebSearch", "WebFetch"];
const CODING_EXTRA: &[&str] = &["MultiEdit", "NotebookEdit"];
const DEVOPS_EXTRA: &[&str] = &["TodoWrite"];

const CODER_PROMPT_TAIL: &str = "Perform code design, implementation, and debugging. Follow best practices \
and write maintainable code. Actively use file operations, command execution, and code editing tools.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProjectManager,
    FrontendCoder,
    BackendCoder,
    DevopsCoder,
}

impl AgentRole {
    pub fn all() -> [AgentRole; 4] {
        [
            AgentRole::ProjectManager,
            AgentRole::FrontendCoder,
            AgentRole::BackendCoder,
            AgentRole::DevopsCoder,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProjectManager => "project_manager",
            AgentRole::FrontendCoder => "frontend_coder",
            AgentRole::BackendCoder => "backend_coder",
            AgentRole::DevopsCoder => "devops_coder",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentRole::ProjectManager => "Project management and task distribution",
            AgentRole::FrontendCoder => "React, Vue.js frontend development",
            AgentRole::BackendCoder => "Python, Node.js backend development",
            AgentRole::DevopsCoder => "Docker, CI/CD infrastructure",
        }
    }

    pub fn is_coder(&self) -> bool {
        !matches!(self, AgentRole::ProjectManager)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::all()
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("Unknown agent role: {}", s))
    }
}

/// A named list of things a role is good at
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityGroup {
    pub name: &'static str,
    pub items: &'static [&'static str],
}

/// Immutable, role-derived configuration of an agent
#[derive(Debug, Clone)]
pub struct RoleProfile {
    pub role: AgentRole,
    pub specialization: &'static str,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
}

impl RoleProfile {
    pub fn for_role(role: AgentRole) -> Self {
        let extra = match role {
            AgentRole::ProjectManager => PROJECT_MANAGER_EXTRA,
            AgentRole::FrontendCoder | AgentRole::BackendCoder => CODING_EXTRA,
            AgentRole::DevopsCoder => DEVOPS_EXTRA,
        };
        let allowed_tools = BASE_TOOLS
            .iter()
            .chain(extra.iter())
            .map(|tool| tool.to_string())
            .collect();

        let specialization = match role {
            AgentRole::ProjectManager => "project planning and coordination",
            AgentRole::FrontendCoder => "React, Vue.js, Angular and other frontend technologies",
            AgentRole::BackendCoder => "Python, Node.js, Java and other backend technologies",
            AgentRole::DevopsCoder => "Docker, Kubernetes, CI/CD and other infrastructure/DevOps technologies",
        };

        let system_prompt = match role {
            AgentRole::ProjectManager => "You are an experienced project manager. \
Analyze tasks, assign work to appropriate coding agents, and manage overall progress. \
Perform efficient work division and scheduling, and lead the team."
                .to_string(),
            _ => format!("You are an expert in {}. {}", specialization, CODER_PROMPT_TAIL),
        };

        Self {
            role,
            specialization,
            system_prompt,
            allowed_tools,
        }
    }

    pub fn capabilities(&self) -> Vec<CapabilityGroup> {
        match self.role {
            AgentRole::ProjectManager => vec![
                group("coding_agents", &["frontend_coder", "backend_coder", "devops_coder"]),
                group("specialties", &["Task decomposition", "Work scheduling", "Progress tracking"]),
            ],
            AgentRole::FrontendCoder => vec![
                group("preferred_frameworks", &["React", "Vue.js", "Angular", "Svelte"]),
                group("ui_libraries", &["Bootstrap", "Tailwind CSS", "Material-UI", "Ant Design"]),
                group(
                    "specialties",
                    &[
                        "Responsive design",
                        "Component architecture",
                        "State management",
                        "Performance optimization",
                        "Accessibility (a11y)",
                    ],
                ),
            ],
            AgentRole::BackendCoder => vec![
                group("preferred_languages", &["Python", "Node.js", "Java", "Go"]),
                group("frameworks", &["FastAPI", "Django", "Express.js", "Spring Boot"]),
                group("databases", &["PostgreSQL", "MySQL", "MongoDB", "Redis"]),
                group(
                    "specialties",
                    &[
                        "API design and development",
                        "Database design and optimization",
                        "Authentication and authorization",
                        "Microservices architecture",
                        "Performance tuning",
                    ],
                ),
            ],
            AgentRole::DevopsCoder => vec![
                group("container_technologies", &["Docker", "Podman", "containerd"]),
                group("orchestration_tools", &["Kubernetes", "Docker Swarm", "Nomad"]),
                group("ci_cd_tools", &["GitHub Actions", "GitLab CI", "Jenkins", "CircleCI"]),
                group("cloud_platforms", &["AWS", "Google Cloud", "Azure", "DigitalOcean"]),
                group(
                    "specialties",
                    &[
                        "Infrastructure as Code",
                        "Containerization and orchestration",
                        "CI/CD pipeline design",
                        "Monitoring and logging",
                        "Security and compliance",
                    ],
                ),
            ],
        }
    }
}

fn group(name: &'static str, items: &'static [&'static str]) -> CapabilityGroup {
    CapabilityGroup { name, items }
}
