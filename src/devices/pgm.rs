// MIT License - Copyright (c) 2026 Peter Wright
// Programmable outputs

/// A programmable output (PGM).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pgm {
    /// 1-based output number
    pub id: u8,
    /// `None` when the panel does not report output feedback.
    pub active: Option<bool>,
}

impl Pgm {
    pub fn new(id: u8) -> Self {
        Self { id, active: None }
    }
}

/// Output state transition reported between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgmEvent {
    Activated,
    Deactivated,
}

impl PgmEvent {
    /// Transition from `old` to `new`, if any. Unknown states never produce one.
    pub fn between(old: Option<bool>, new: Option<bool>) -> Option<Self> {
        match (old, new) {
            (Some(false), Some(true)) => Some(Self::Activated),
            (Some(true), Some(false)) => Some(Self::Deactivated),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Activated => "Activated",
            Self::Deactivated => "Deactivated",
        }
    }
}
