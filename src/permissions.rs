use std::sync::atomic::{AtomicU8, Ordering};

/// Permission status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }

    fn to_u8(self) -> u8 {
        match self {
            PermissionStatus::Granted => 0,
            PermissionStatus::Denied => 1,
            PermissionStatus::NotDetermined => 2,
            PermissionStatus::Restricted => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => PermissionStatus::Granted,
            1 => PermissionStatus::Denied,
            3 => PermissionStatus::Restricted,
            _ => PermissionStatus::NotDetermined,
        }
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Capability check gating camera open
pub trait PermissionProvider: Send + Sync {
    fn check(&self) -> PermissionStatus;
}

/// Fixed answer, for hosts that resolve permission before building the controller
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub PermissionStatus);

impl PermissionProvider for StaticPermission {
    fn check(&self) -> PermissionStatus {
        self.0
    }
}

/// Permission state the host updates when the user answers a prompt
#[derive(Debug)]
pub struct SharedPermission {
    status: AtomicU8,
}

impl SharedPermission {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: AtomicU8::new(status.to_u8()),
        }
    }

    pub fn set(&self, status: PermissionStatus) {
        self.status.store(status.to_u8(), Ordering::SeqCst);
    }
}

impl PermissionProvider for SharedPermission {
    fn check(&self) -> PermissionStatus {
        PermissionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }
}
