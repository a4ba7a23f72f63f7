//! Messaging-account connections (devices)

use crate::api::types::RawConnection;

/// Device state reported for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Active,
    /// The session is open in another browser tab.
    ViewedElsewhere,
    /// The phone lost internet access.
    DisconnectedNoInternet,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Battery {
    pub level: u8,
    pub charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStatus {
    pub state: DeviceState,
    pub battery: Battery,
}

/// A registered messaging endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: i64,
    pub account_name: String,
    pub account_number: String,
    pub account_device: String,
    /// Routing key used when sending through this connection.
    pub uuid: String,
    pub active: bool,
    pub device_status: DeviceStatus,
}

impl From<RawConnection> for Connection {
    fn from(raw: RawConnection) -> Self {
        let status = &raw.status;
        // Precedence: no-internet, then disconnected, then another tab.
        let state = if status.celular_desconectado_internet {
            DeviceState::DisconnectedNoInternet
        } else if status.desconectado {
            DeviceState::Disconnected
        } else if status.outra_aba {
            DeviceState::ViewedElsewhere
        } else {
            DeviceState::Active
        };
        let level = status.nivel_bateria.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8;

        Self {
            id: raw.id_whatsapp_conexao,
            account_name: raw.conta_nome.unwrap_or_default(),
            account_number: raw.conta_numero.unwrap_or_default(),
            account_device: raw.conta_marca_celular.unwrap_or_default(),
            uuid: raw.uuid,
            active: raw.flag_ativo,
            device_status: DeviceStatus {
                state,
                battery: Battery {
                    level,
                    charging: status.carregando,
                },
            },
        }
    }
}
