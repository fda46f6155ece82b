//! Navigation gating on session state.

use super::session::{Session, SessionPhase};

/// Where the app should send the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Recovery has not finished; routing now could bounce a signed-in user
    /// to the sign-in screen.
    Wait,
    SignIn,
    App,
}

pub fn destination(session: &Session) -> Destination {
    match session.phase() {
        SessionPhase::Uninitialized => Destination::Wait,
        SessionPhase::Anonymous => Destination::SignIn,
        SessionPhase::Authenticated => Destination::App,
    }
}
