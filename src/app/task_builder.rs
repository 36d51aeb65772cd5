/// Fluent builder for structured project submissions
#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    objective: String,
    requirements: Vec<String>,
    constraints: Vec<String>,
    deliverables: Vec<String>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn add_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn add_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements.extend(requirements.into_iter().map(Into::into));
        self
    }

    pub fn add_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn add_constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.extend(constraints.into_iter().map(Into::into));
        self
    }

    pub fn add_deliverable(mut self, deliverable: impl Into<String>) -> Self {
        self.deliverables.push(deliverable.into());
        self
    }

    pub fn add_deliverables<I, S>(mut self, deliverables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deliverables.extend(deliverables.into_iter().map(Into::into));
        self
    }

    /// Render as one item per line: objective, then requirements,
    /// constraints and deliverables. Empty sections are left out.
    pub fn build(&self) -> String {
        let mut lines = Vec::new();

        if !self.objective.is_empty() {
            lines.push(format!("Main Objective: {}", self.objective));
        }
        push_section(&mut lines, "Requirements:", &self.requirements);
        push_section(&mut lines, "Constraints:", &self.constraints);
        push_section(&mut lines, "Deliverables:", &self.deliverables);

        lines.join("\n")
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn push_section(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(heading.to_string());
    lines.extend(items.iter().map(|item| format!("- {}", item)));
}

pub fn create_web_app_task() -> String {
    TaskBuilder::new()
        .set_objective("Develop a full-stack web application")
        .add_requirements([
            "User authentication system",
            "Database integration",
            "Responsive design",
            "RESTful API",
        ])
        .add_constraints([
            "Use modern frameworks",
            "Follow security best practices",
            "Complete within reasonable time",
        ])
        .add_deliverables([
            "Working web application",
            "API documentation",
            "Test suite",
            "Deployment guide",
        ])
        .build()
}

pub fn create_ml_pipeline_task() -> String {
    TaskBuilder::new()
        .set_objective("Build machine learning pipeline and dashboard")
        .add_requirements([
            "Data preprocessing capabilities",
            "Multiple ML algorithms",
            "Model evaluation framework",
            "Interactive dashboard",
            "Real-time predictions",
        ])
        .add_constraints([
            "Python-based implementation",
            "Use scikit-learn and common libraries",
            "Docker deployment ready",
        ])
        .add_deliverables([
            "Data preprocessing pipeline",
            "Trained ML models",
            "Web dashboard",
            "API server",
            "Documentation",
        ])
        .build()
}

pub fn quick_task_examples() -> Vec<&'static str> {
    vec![
        "Create a simple Python calculator app with tests",
        "Design and implement a RESTful API with basic CRUD operations",
        "Build a data analysis pipeline and visualize CSV data",
        "Create a web application security checklist",
        "Implement a machine learning model performance evaluation framework",
    ]
}
