//! Agent entity

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub upstream_id: String,
    pub name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
}

impl Agent {
    pub fn new(upstream_id: String, name: String) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::AGENT_PREFIX, &[&upstream_id]),
            upstream_id,
            name,
            username: None,
            email: None,
            is_active: true,
        }
    }
}
