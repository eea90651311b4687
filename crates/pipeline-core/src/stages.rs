//! Built-in catalog of extra build stages (quality gates, scanners) that can
//! be attached to a project under `extra_stages`.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    PreBuild,
    Build,
    PostBuild,
}

impl StagePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            StagePhase::PreBuild => "pre_build",
            StagePhase::Build => "build",
            StagePhase::PostBuild => "post_build",
        }
    }
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret the stage reads from AWS Secrets Manager at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageSecret {
    pub env: &'static str,
    pub secret: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub phase: StagePhase,
    pub secrets: &'static [StageSecret],
    pub commands: &'static [&'static str],
    /// Settings the user must supply, as `(key, description)`.
    pub required_config: &'static [(&'static str, &'static str)],
}

impl StageDefinition {
    pub fn required_keys(&self) -> impl Iterator<Item = &'static str> {
        self.required_config.iter().map(|(key, _)| *key)
    }
}

const CATALOG: &[StageDefinition] = &[
    StageDefinition {
        name: "sonarqube",
        display_name: "SonarQube Cloud Analysis",
        description: "Code quality and security analysis with SonarQube Cloud",
        phase: StagePhase::PostBuild,
        secrets: &[StageSecret {
            env: "SONAR_TOKEN",
            secret: "sonarqube-token",
        }],
        commands: &[
            "pip install sonar-scanner",
            "sonar-scanner -Dsonar.projectKey={project_key} -Dsonar.organization={organization} -Dsonar.host.url=https://sonarcloud.io -Dsonar.login=$SONAR_TOKEN",
        ],
        required_config: &[
            ("project_key", "SonarQube project key"),
            ("organization", "SonarQube organization"),
        ],
    },
    StageDefinition {
        name: "snyk",
        display_name: "Snyk Security Scan",
        description: "Security vulnerability scanning with Snyk",
        phase: StagePhase::PostBuild,
        secrets: &[StageSecret {
            env: "SNYK_TOKEN",
            secret: "snyk-token",
        }],
        commands: &[
            "npm install -g snyk",
            "snyk auth $SNYK_TOKEN",
            "snyk test --severity-threshold=high",
            "snyk monitor",
        ],
        required_config: &[],
    },
    StageDefinition {
        name: "codecov",
        display_name: "Codecov Coverage Upload",
        description: "Upload test coverage to Codecov",
        phase: StagePhase::PostBuild,
        secrets: &[StageSecret {
            env: "CODECOV_TOKEN",
            secret: "codecov-token",
        }],
        commands: &[
            "pip install pytest-cov codecov",
            "python -m pytest --cov=. --cov-report=xml",
            "codecov -t $CODECOV_TOKEN",
        ],
        required_config: &[],
    },
    StageDefinition {
        name: "docker",
        display_name: "Docker Build & Push",
        description: "Build and push Docker images to ECR",
        phase: StagePhase::PostBuild,
        secrets: &[],
        commands: &[
            "aws ecr get-login-password --region $AWS_DEFAULT_REGION | docker login --username AWS --password-stdin $ECR_REPOSITORY_URI",
            "docker build -t $IMAGE_REPO_NAME:$IMAGE_TAG .",
            "docker tag $IMAGE_REPO_NAME:$IMAGE_TAG $ECR_REPOSITORY_URI:$IMAGE_TAG",
            "docker push $ECR_REPOSITORY_URI:$IMAGE_TAG",
        ],
        required_config: &[("ecr_repository", "ECR repository name")],
    },
    StageDefinition {
        name: "eslint",
        display_name: "ESLint Code Quality",
        description: "JavaScript/TypeScript code quality with ESLint",
        phase: StagePhase::Build,
        secrets: &[],
        commands: &[
            "npm install -g eslint",
            "eslint . --ext .js,.jsx,.ts,.tsx --format json --output-file eslint-report.json || true",
        ],
        required_config: &[],
    },
    StageDefinition {
        name: "bandit",
        display_name: "Bandit Security Linter",
        description: "Python security linter with Bandit",
        phase: StagePhase::Build,
        secrets: &[],
        commands: &[
            "pip install bandit",
            "bandit -r . -f json -o bandit-report.json || true",
        ],
        required_config: &[],
    },
    StageDefinition {
        name: "custom",
        display_name: "Custom Stage",
        description: "Custom build stage with user-defined commands",
        phase: StagePhase::Build,
        secrets: &[],
        commands: &[],
        required_config: &[("commands", "List of custom commands to run")],
    },
];

pub fn catalog() -> &'static [StageDefinition] {
    CATALOG
}

pub fn find(name: &str) -> Option<&'static StageDefinition> {
    CATALOG.iter().find(|s| s.name == name)
}

pub fn by_phase(phase: StagePhase) -> impl Iterator<Item = &'static StageDefinition> {
    CATALOG.iter().filter(move |s| s.phase == phase)
}
