use core::fmt;
use spin::Mutex;

/// Most components the boot status table can track.
pub const MAX_COMPONENTS: usize = 8;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

/// Fixed-capacity table of component statuses. Needs no heap, so it can
/// record phases that run before the allocator is up.
pub struct StatusTable<const N: usize> {
    entries: [Option<ComponentStatus>; N],
    len: usize,
}

impl<const N: usize> StatusTable<N> {
    pub const fn new() -> Self {
        Self {
            entries: [None; N],
            len: 0,
        }
    }

    /// Add `name` as `NotStarted`. Registering a known name is a no-op;
    /// returns `false` only when the table is full.
    pub fn register(&mut self, name: &'static str) -> bool {
        if self.get(name).is_some() {
            return true;
        }
        if self.len == N {
            return false;
        }
        self.entries[self.len] = Some(ComponentStatus::new(name));
        self.len += 1;
        true
    }

    /// Returns `false` if `name` was never registered.
    pub fn update(&mut self, name: &'static str, status: InitStatus) -> bool {
        match self.entries[..self.len]
            .iter_mut()
            .flatten()
            .find(|c| c.name == name)
        {
            Some(component) => {
                component.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentStatus> {
        self.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentStatus> + '_ {
        self.entries[..self.len].iter().flatten().copied()
    }
}

impl<const N: usize> Default for StatusTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

static INIT_STATUS: Mutex<StatusTable<MAX_COMPONENTS>> = Mutex::new(StatusTable::new());

/// Track kernel component initialization
pub fn register_component(name: &'static str) {
    if !INIT_STATUS.lock().register(name) {
        log::warn!("status table full, not tracking {}", name);
    }
}

pub fn update_component_status(name: &'static str, status: InitStatus) {
    INIT_STATUS.lock().update(name, status);
}

/// Log one line per tracked component, at error level for failed ones and
/// warn level for ones that never finished.
pub fn log_statuses() {
    for component in INIT_STATUS.lock().iter() {
        if component.is_failed() {
            log::error!("  {:<20} {}", component.name, component.status);
        } else if component.is_complete() {
            log::info!("  {:<20} {}", component.name, component.status);
        } else {
            log::warn!("  {:<20} {}", component.name, component.status);
        }
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}
