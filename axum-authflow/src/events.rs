//! Notifications emitted by the state machine.

use tokio::sync::broadcast;

use crate::config::EventNames;

/// Which transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A user logged in.
    LoggedIn,
    /// A user logged out.
    LoggedOut,
    /// An account was registered.
    Registered,
}

impl EventKind {
    /// The configured name of this kind of event.
    pub fn name(self, names: &EventNames) -> &str {
        match self {
            EventKind::LoggedIn => &names.user_logged_in,
            EventKind::LoggedOut => &names.user_logged_out,
            EventKind::Registered => &names.user_registered,
        }
    }
}

/// A single notification.
#[derive(Debug, Clone)]
pub struct AuthEvent<User> {
    /// Configured event name, e.g. `Auth.userLoggedIn`.
    pub name: String,
    /// The transition reported.
    pub kind: EventKind,
    /// Primary key value of the user concerned.
    pub identity: String,
    /// The user record, when the provider returned one.
    pub user: Option<User>,
}

/// Fan-out of [`AuthEvent`]s to any number of listeners.
///
/// Emitting never waits on listeners. Events emitted while nobody listens are
/// dropped, and a listener which falls too far behind skips the oldest
/// events.
///
/// ```rust
/// use axum_authflow::AuthEvents;
///
/// # #[derive(Debug, Clone)] struct User;
/// let events = AuthEvents::<User>::new(16);
/// let mut listener = events.subscribe();
/// # drop(listener);
/// ```
#[derive(Debug, Clone)]
pub struct AuthEvents<User> {
    tx: broadcast::Sender<AuthEvent<User>>,
}

impl<User: Clone> AuthEvents<User> {
    /// Creates a channel buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Registers a new listener.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent<User>> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(
        &self,
        names: &EventNames,
        kind: EventKind,
        identity: &str,
        user: Option<User>,
    ) {
        let name = kind.name(names).to_owned();
        tracing::debug!(event = %name, identity, "emitting auth event");

        let event = AuthEvent {
            name,
            kind,
            identity: identity.to_owned(),
            user,
        };

        if self.tx.send(event).is_err() {
            tracing::trace!("no auth event listeners");
        }
    }
}

impl<User: Clone> Default for AuthEvents<User> {
    fn default() -> Self {
        Self::new(64)
    }
}
