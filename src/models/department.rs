//! Department entity

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub upstream_code: String,
    pub name: String,
    pub is_active: bool,
    pub is_leaf: bool,
}

impl Department {
    pub fn new(upstream_code: String, name: String) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::DEPARTMENT_PREFIX, &[&upstream_code]),
            upstream_code,
            name,
            is_active: true,
            is_leaf: true,
        }
    }
}
