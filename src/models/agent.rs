//! Agents (operators) and their department membership

use std::sync::Arc;

use super::Department;
use crate::api::types::RawAgent;

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: i64,
    pub email: String,
    pub admin: bool,
    pub profile_picture: Option<String>,
    pub name: String,
    pub departments: Vec<Arc<Department>>,
}

impl Agent {
    /// Build an agent, resolving its delimited department list through
    /// `lookup`. Identifiers that do not resolve are dropped.
    pub fn from_raw(raw: RawAgent, lookup: impl Fn(i64) -> Option<Arc<Department>>) -> Self {
        let departments = raw
            .id_departamento_fk
            .as_deref()
            .map(parse_department_ids)
            .unwrap_or_default()
            .into_iter()
            .filter_map(lookup)
            .collect();

        Self {
            id: raw.id_usuario,
            email: raw.email,
            admin: raw.flag_gestor,
            profile_picture: raw.foto_perfil,
            name: raw.nome,
            departments,
        }
    }
}

/// Split `"1, 4,9"` into `[1, 4, 9]`, skipping anything that is not an id.
pub fn parse_department_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}
