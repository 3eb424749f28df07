//! JSON bodies and query strings accepted by the API, plus response views
//! that differ from the ledger types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{AccountDraft, RoomDraft, ServiceDraft};
use crate::model::*;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomTypeBody {
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomBody {
    pub number: String,
    pub room_type: RoomTypeBody,
    pub price: Cents,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl From<RoomBody> for RoomDraft {
    fn from(body: RoomBody) -> Self {
        RoomDraft {
            number: body.number,
            room_type: RoomType {
                name: body.room_type.name,
                capacity: body.room_type.capacity,
            },
            price: body.price,
            description: body.description,
            image_url: body.image_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomStatusBody {
    pub status: RoomStatus,
}

/// `GET /rooms`: both dates filter by availability; neither lists everything.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomListQuery {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub min_capacity: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StayQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityView {
    pub room_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub available: bool,
}

fn default_service_status() -> ServiceStatus {
    ServiceStatus::Available
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceBody {
    pub name: String,
    pub price: Cents,
    pub description: Option<String>,
    #[serde(default = "default_service_status")]
    pub status: ServiceStatus,
}

impl From<ServiceBody> for ServiceDraft {
    fn from(body: ServiceBody) -> Self {
        ServiceDraft {
            name: body.name,
            price: body.price,
            description: body.description,
            status: body.status,
        }
    }
}

fn default_role() -> Role {
    Role::Customer
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountBody {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    pub password: String,
}

impl From<AccountBody> for AccountDraft {
    fn from(body: AccountBody) -> Self {
        AccountDraft {
            email: body.email,
            name: body.name,
            phone: body.phone,
            role: body.role,
            password: body.password,
        }
    }
}

/// Account without its password hash.
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: Ulid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        AccountView {
            id: account.id,
            email: account.email,
            name: account.name,
            phone: account.phone,
            role: account.role,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceLine {
    pub service_id: Ulid,
    pub quantity: u32,
}

impl From<ServiceLine> for ServiceRequest {
    fn from(line: ServiceLine) -> Self {
        ServiceRequest {
            service_id: line.service_id,
            quantity: line.quantity,
        }
    }
}

pub fn service_requests(lines: &[ServiceLine]) -> Vec<ServiceRequest> {
    lines.iter().copied().map(ServiceRequest::from).collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReserveBody {
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default)]
    pub services: Vec<ServiceLine>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuoteBody {
    pub room_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default)]
    pub services: Vec<ServiceLine>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentBody {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettleBody {
    pub status: PaymentStatus,
}
