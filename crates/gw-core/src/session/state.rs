//! Session lifecycle states

/// Lifecycle of a map session
///
/// `Uninitialized → Initializing → Active → Disposed`. `Disposed` is
/// terminal: a new credential needs a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initializing,
    Active,
    Disposed,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, SessionState::Disposed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Disposed => "disposed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
