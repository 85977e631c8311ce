//! Account-level entities looked up once per run.

use serde::{Deserialize, Serialize};

/// A team project in the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

/// A git repository hosted in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepositoryRef {
    pub id: String,
    pub name: String,
}

/// A build (pipeline) definition of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefinitionRef {
    pub id: i64,
    pub name: String,
}
