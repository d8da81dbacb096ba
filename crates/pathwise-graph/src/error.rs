#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("prerequisite cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("skill {skill} references unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { skill: String, prerequisite: String },

    #[error("duplicate skill: {0}")]
    Duplicate(String),

    #[error("skill {0} is already published with different content")]
    Immutable(String),

    #[error("invalid skill: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
