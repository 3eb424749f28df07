use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::auth;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Ledger, LedgerError};

/// Admin-supplied room fields. Status starts `available`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDraft {
    pub number: String,
    pub room_type: RoomType,
    pub price: Cents,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDraft {
    pub name: String,
    pub price: Cents,
    pub description: Option<String>,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDraft {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub password: String,
}

fn check_name(value: &str, what: &'static str) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        return Err(LedgerError::Invalid(what));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(LedgerError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn check_text(value: &Option<String>) -> Result<(), LedgerError> {
    if let Some(v) = value
        && v.len() > MAX_TEXT_LEN
    {
        return Err(LedgerError::LimitExceeded("text too long"));
    }
    Ok(())
}

fn check_price(price: Cents) -> Result<(), LedgerError> {
    if price < 0 {
        return Err(LedgerError::Invalid("price must not be negative"));
    }
    if price > MAX_PRICE_CENTS {
        return Err(LedgerError::LimitExceeded("price too high"));
    }
    Ok(())
}

impl RoomDraft {
    fn validate(&self) -> Result<(), LedgerError> {
        check_name(&self.number, "room number must not be empty")?;
        check_name(&self.room_type.name, "room type name must not be empty")?;
        if self.room_type.capacity == 0 {
            return Err(LedgerError::Invalid("room capacity must be at least 1"));
        }
        check_price(self.price)?;
        check_text(&self.description)?;
        check_text(&self.image_url)
    }
}

impl ServiceDraft {
    fn validate(&self) -> Result<(), LedgerError> {
        check_name(&self.name, "service name must not be empty")?;
        check_price(self.price)?;
        check_text(&self.description)
    }
}

impl AccountDraft {
    fn validate(&self) -> Result<(), LedgerError> {
        let email = self.email.trim();
        if email.len() < 3 || !email.contains('@') {
            return Err(LedgerError::Invalid("email is not valid"));
        }
        check_name(email, "email is not valid")?;
        check_name(&self.name, "name must not be empty")?;
        check_text(&self.phone)?;
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(LedgerError::Invalid("password too short"));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(LedgerError::LimitExceeded("password too long"));
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Ledger {
    /// Write-lock a room, failing if it was deleted while we waited.
    pub(super) async fn lock_room(
        &self,
        room_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, LedgerError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(LedgerError::RoomNotFound(room_id))?;
        let guard = rs.write_owned().await;
        if !self.rooms.contains_key(&room_id) {
            return Err(LedgerError::RoomNotFound(room_id));
        }
        Ok(guard)
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, draft: RoomDraft) -> Result<Room, LedgerError> {
        draft.validate()?;
        let _gate = self.write_gate().await;
        let _catalog = self.catalog_lock.lock().await;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(LedgerError::LimitExceeded("too many rooms"));
        }
        if self.room_numbers.contains_key(&draft.number) {
            return Err(LedgerError::DuplicateRoomNumber(draft.number));
        }

        let room = Room {
            id: Ulid::new(),
            number: draft.number,
            room_type: draft.room_type,
            price: draft.price,
            status: RoomStatus::Available,
            description: draft.description,
            image_url: draft.image_url,
        };
        let event = Event::RoomCreated { room: room.clone() };
        self.wal_append(&event).await?;
        self.room_numbers.insert(room.number.clone(), room.id);
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.rooms.len() as f64);
        self.notify.send(room.id, &event);
        info!(room_id = %room.id, number = %room.number, "room created");
        Ok(room)
    }

    /// Replace a room's descriptive fields and price. Existing bookings keep
    /// the price they were reserved at.
    pub async fn update_room(&self, id: Ulid, draft: RoomDraft) -> Result<Room, LedgerError> {
        draft.validate()?;
        let _gate = self.write_gate().await;
        let _catalog = self.catalog_lock.lock().await;
        let mut guard = self.lock_room(id).await?;
        if let Some(owner) = self.room_numbers.get(&draft.number)
            && *owner.value() != id
        {
            return Err(LedgerError::DuplicateRoomNumber(draft.number));
        }

        let event = Event::RoomUpdated {
            id,
            number: draft.number,
            room_type: draft.room_type,
            price: draft.price,
            description: draft.description,
            image_url: draft.image_url,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.room.clone())
    }

    /// Toggle the maintenance override. Never derives from bookings.
    pub async fn set_room_status(&self, id: Ulid, status: RoomStatus) -> Result<Room, LedgerError> {
        let _gate = self.write_gate().await;
        let mut guard = self.lock_room(id).await?;
        let event = Event::RoomStatusChanged { id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(room_id = %id, ?status, "room status changed");
        Ok(guard.room.clone())
    }

    /// Hard-delete a room that no booking has ever referenced.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), LedgerError> {
        let _gate = self.write_gate().await;
        let _catalog = self.catalog_lock.lock().await;
        let guard = self.lock_room(id).await?;
        if !guard.bookings.is_empty() {
            return Err(LedgerError::RoomHasBookings(id));
        }

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        // Removed while still holding the room lock so waiters see it gone.
        self.rooms.remove(&id);
        self.room_numbers.remove(&guard.room.number);
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.rooms.len() as f64);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        info!(room_id = %id, "room deleted");
        Ok(())
    }

    // ── Services ─────────────────────────────────────────────

    pub async fn create_service(&self, draft: ServiceDraft) -> Result<AdditionalService, LedgerError> {
        draft.validate()?;
        let _gate = self.write_gate().await;
        if self.services.len() >= MAX_SERVICES {
            return Err(LedgerError::LimitExceeded("too many services"));
        }
        let service = AdditionalService {
            id: Ulid::new(),
            name: draft.name,
            price: draft.price,
            description: draft.description,
            status: draft.status,
        };
        self.persist_catalog(&Event::ServiceCreated {
            service: service.clone(),
        })
        .await?;
        Ok(service)
    }

    /// Price changes only affect future reservations.
    pub async fn update_service(
        &self,
        id: Ulid,
        draft: ServiceDraft,
    ) -> Result<AdditionalService, LedgerError> {
        draft.validate()?;
        let _gate = self.write_gate().await;
        let _catalog = self.catalog_lock.lock().await;
        if !self.services.contains_key(&id) {
            return Err(LedgerError::ServiceNotFound(id));
        }
        let service = AdditionalService {
            id,
            name: draft.name,
            price: draft.price,
            description: draft.description,
            status: draft.status,
        };
        self.persist_catalog(&Event::ServiceUpdated {
            service: service.clone(),
        })
        .await?;
        Ok(service)
    }

    // ── Accounts ─────────────────────────────────────────────

    pub async fn create_account(&self, draft: AccountDraft) -> Result<Account, LedgerError> {
        draft.validate()?;
        let email = normalize_email(&draft.email);
        if self.account_emails.contains_key(&email) {
            return Err(LedgerError::DuplicateEmail(email));
        }

        let password = draft.password;
        let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
            .await
            .map_err(|e| LedgerError::Storage(format!("password hashing task failed: {e}")))?
            .map_err(|e| LedgerError::Storage(format!("password hashing failed: {e}")))?;

        let _gate = self.write_gate().await;
        let _catalog = self.catalog_lock.lock().await;
        if self.accounts.len() >= MAX_ACCOUNTS {
            return Err(LedgerError::LimitExceeded("too many accounts"));
        }
        // Re-checked under the lock; the early check only skips hashing.
        if self.account_emails.contains_key(&email) {
            return Err(LedgerError::DuplicateEmail(email));
        }

        let account = Account {
            id: Ulid::new(),
            email,
            name: draft.name.trim().to_string(),
            phone: draft.phone,
            role: draft.role,
            password_hash,
        };
        self.persist_catalog(&Event::AccountCreated {
            account: account.clone(),
        })
        .await?;
        info!(account_id = %account.id, role = ?account.role, "account created");
        Ok(account)
    }

    /// Check an email/password pair. Unknown email and wrong password are
    /// indistinguishable to the caller.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Account, LedgerError> {
        let account = self
            .account_emails
            .get(&normalize_email(email))
            .and_then(|id| self.accounts.get(id.value()).map(|a| a.value().clone()))
            .ok_or(LedgerError::InvalidCredentials)?;

        let password = password.to_string();
        let hash = account.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
            .await
            .map_err(|e| LedgerError::Storage(format!("password check task failed: {e}")))?;
        if ok {
            Ok(account)
        } else {
            Err(LedgerError::InvalidCredentials)
        }
    }
}
