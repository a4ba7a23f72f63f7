//! Departments: a nested routing tree with a flat lookup view

use crate::api::types::RawDepartment;

#[derive(Debug, Clone, PartialEq)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub internal: bool,
    pub sub_departments: Vec<Department>,
}

impl Department {
    /// Build the tree for one wire node and all of its descendants.
    pub fn from_raw(raw: RawDepartment) -> Self {
        Self {
            id: raw.id_departamento,
            name: raw.nome,
            internal: raw.flag_departamento_interno,
            sub_departments: raw
                .sub_departamentos
                .unwrap_or_default()
                .into_iter()
                .map(Department::from_raw)
                .collect(),
        }
    }

    /// Every node of `tree`, at every depth, in pre-order.
    pub fn flatten(tree: &[Department]) -> Vec<&Department> {
        let mut out = Vec::new();
        let mut stack: Vec<&Department> = tree.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.sub_departments.iter().rev());
        }
        out
    }
}
