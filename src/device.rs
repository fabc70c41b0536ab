//! Local device key-value collaborator: holds the user's profile (name,
//! icon) and the active session between page loads.
//!
//! The backing store may be unavailable (private browsing, quota); every
//! access goes through [`DeviceStore`] and callers degrade gracefully on
//! `None`/`false` instead of failing.

use crate::types::{Role, SessionCode, DEFAULT_ICON};

/// Keys used in the device store.
pub mod keys {
    pub const USER_NAME: &str = "userName";
    pub const USER_ICON: &str = "userIcon";
    pub const SESSION_CODE: &str = "sessionCode";
    pub const SESSION_ROLE: &str = "sessionRole";
}

/// Minimal key-value surface of the device store.
pub trait DeviceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Returns false when the value could not be written.
    fn set(&self, key: &str, value: &str) -> bool;
    fn remove(&self, key: &str);
}

/// The user's stored profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub icon: String,
}

/// Read the stored profile, if a usable name is present.
pub fn load_profile(device: &dyn DeviceStore) -> Option<Profile> {
    let name = device.get(keys::USER_NAME)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Profile {
        name: name.to_string(),
        icon: device
            .get(keys::USER_ICON)
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_ICON.to_string()),
    })
}

pub fn store_profile(device: &dyn DeviceStore, profile: &Profile) {
    if !device.set(keys::USER_NAME, &profile.name)
        || !device.set(keys::USER_ICON, &profile.icon)
    {
        tracing::warn!("device store unavailable, profile will not persist");
    }
}

/// Remember the active session for the next page load.
pub fn store_session(device: &dyn DeviceStore, code: SessionCode, role: Role) {
    if !device.set(keys::SESSION_CODE, &code.to_string())
        || !device.set(keys::SESSION_ROLE, role.as_str())
    {
        tracing::warn!("device store unavailable, session will not persist");
    }
}

/// The remembered session, if both keys parse.
pub fn load_session(device: &dyn DeviceStore) -> Option<(SessionCode, Role)> {
    let code = device.get(keys::SESSION_CODE)?.parse().ok()?;
    let role = Role::parse(&device.get(keys::SESSION_ROLE)?)?;
    Some((code, role))
}

/// Forget the active session (the code no longer resolves, or the user
/// left).
pub fn clear_session(device: &dyn DeviceStore) {
    device.remove(keys::SESSION_CODE);
    device.remove(keys::SESSION_ROLE);
}

/// In-memory device store for tests and the demo binary.
pub struct MemoryDevice {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
    available: bool,
}

impl MemoryDevice {
    pub fn new() -> MemoryDevice {
        MemoryDevice {
            values: Default::default(),
            available: true,
        }
    }

    /// A device store that accepts nothing, to exercise the degraded path.
    pub fn unavailable() -> MemoryDevice {
        MemoryDevice {
            available: false,
            ..MemoryDevice::new()
        }
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStore for MemoryDevice {
    fn get(&self, key: &str) -> Option<String> {
        if !self.available {
            return None;
        }
        self.values.lock().expect("device poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        if !self.available {
            return false;
        }
        self.values
            .lock()
            .expect("device poisoned")
            .insert(key.to_string(), value.to_string());
        true
    }

    fn remove(&self, key: &str) {
        if self.available {
            self.values.lock().expect("device poisoned").remove(key);
        }
    }
}
