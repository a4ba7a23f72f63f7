//! Service calls ("chamados")

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Agent, Connection, Contact, Department};

/// Lifecycle status of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    DepartmentChoice,
    Waiting,
    InAttendance,
    Finished,
}

impl CallStatus {
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim() {
            "escolhaDepartamento" => Some(Self::DepartmentChoice),
            "aguardando" => Some(Self::Waiting),
            "atendimento" => Some(Self::InAttendance),
            "finalizado" => Some(Self::Finished),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::DepartmentChoice => "escolhaDepartamento",
            Self::Waiting => "aguardando",
            Self::InAttendance => "atendimento",
            Self::Finished => "finalizado",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A tracked service session. Connection and contact are always resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: i64,
    pub agent: Option<Arc<Agent>>,
    pub connection: Arc<Connection>,
    pub department: Option<Arc<Department>>,
    pub contact: Arc<Contact>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub status: CallStatus,
}

impl Call {
    pub fn agent_id(&self) -> Option<i64> {
        self.agent.as_ref().map(|a| a.id)
    }

    pub fn department_id(&self) -> Option<i64> {
        self.department.as_ref().map(|d| d.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        for status in [
            CallStatus::DepartmentChoice,
            CallStatus::Waiting,
            CallStatus::InAttendance,
            CallStatus::Finished,
        ] {
            assert_eq!(CallStatus::from_wire(status.as_wire()), Some(status));
        }
        assert_eq!(CallStatus::from_wire("transferido"), None);
    }
}
