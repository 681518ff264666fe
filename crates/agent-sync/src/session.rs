use chrono::{DateTime, Local};

/// State of one agent run, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncSession {
    computer_id: Option<u64>,
    start_date: DateTime<Local>,
    pms_status_ok: bool,
    /// User of the graphical session, reported with the attributes.
    pub graphic_user: String,
    /// Keep the error ledger after upload.
    pub debug: bool,
}

impl SyncSession {
    /// Start a session now.
    pub fn new(graphic_user: impl Into<String>, debug: bool) -> Self {
        Self {
            computer_id: None,
            start_date: Local::now(),
            pms_status_ok: true,
            graphic_user: graphic_user.into(),
            debug,
        }
    }

    /// Server id of this computer, once resolved.
    pub fn computer_id(&self) -> Option<u64> {
        self.computer_id
    }

    /// Cache the resolved id. The first value wins.
    pub fn set_computer_id(&mut self, id: u64) -> u64 {
        *self.computer_id.get_or_insert(id)
    }

    pub fn start_date(&self) -> DateTime<Local> {
        self.start_date
    }

    /// No package management action has failed so far.
    pub fn pms_status_ok(&self) -> bool {
        self.pms_status_ok
    }

    /// Record a package management failure. Never undone within a run.
    pub fn pms_failed(&mut self) {
        self.pms_status_ok = false;
    }
}
