// SPDX-License-Identifier: MIT

//! Client session controller and navigation guard.
//!
//! The SPA mirrors the provider's auth state into one reactive snapshot.
//! A controller instance owns exactly one listener over the provider's
//! auth-state events for its whole lifetime; it is constructed explicitly
//! and handed to whatever needs session state instead of living as a
//! module-level singleton.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Auth-state change emitted by the identity SDK listener.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(SessionUser),
    SignedOut,
}

/// Signed-in user as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// Group claims from the freshest ID token
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Guest,
    Member,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<SessionUser>,
    pub status: SessionStatus,
    pub groups: Vec<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            user: None,
            status: SessionStatus::Guest,
            groups: Vec::new(),
        }
    }
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

struct SessionInner {
    state: watch::Sender<SessionSnapshot>,
    initialized: watch::Sender<bool>,
    listener_attached: AtomicBool,
}

/// Owns the auth-state subscription and the reactive session fields.
///
/// Cloning shares the same underlying state, so one controller can be
/// handed to the router, views, and the initialization gate alike.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let (initialized, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                state,
                initialized,
                listener_attached: AtomicBool::new(false),
            }),
        }
    }

    /// Attach the provider listener and wait for the first auth-state
    /// change (signed-in or signed-out).
    ///
    /// Single-flight: the first caller attaches the listener; every
    /// caller, first or later, returns once initialization has resolved.
    /// The listener keeps applying subsequent changes indefinitely.
    pub async fn initialize(&self, events: mpsc::Receiver<AuthEvent>) {
        if !self.inner.listener_attached.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let mut events = events;
                while let Some(event) = events.recv().await {
                    match event {
                        AuthEvent::SignedIn(user) => inner.apply_sign_in(user),
                        AuthEvent::SignedOut => inner.apply_sign_out(),
                    }
                    // The first state change resolves initialization;
                    // replaying true is a no-op afterwards.
                    inner.initialized.send_replace(true);
                }
            });
        }

        self.wait_initialized().await;
    }

    async fn wait_initialized(&self) {
        let mut rx = self.inner.initialized.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Mirror a completed login (password or popup) into session state.
    ///
    /// The ambient listener delivers the same change; applying it twice
    /// is harmless because assignment is idempotent.
    pub fn apply_sign_in(&self, user: SessionUser) {
        self.inner.apply_sign_in(user);
    }

    /// Mirror a completed logout into session state.
    pub fn apply_sign_out(&self) {
        self.inner.apply_sign_out();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to session changes (for the router and UI bindings).
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionInner {
    fn apply_sign_in(&self, user: SessionUser) {
        let next = SessionSnapshot {
            groups: user.groups.clone(),
            status: SessionStatus::Member,
            user: Some(user),
        };
        self.state.send_if_modified(|snapshot| {
            if *snapshot == next {
                false
            } else {
                *snapshot = next.clone();
                true
            }
        });
    }

    fn apply_sign_out(&self) {
        self.state.send_if_modified(|snapshot| {
            if snapshot.user.is_none() && snapshot.groups.is_empty() {
                false
            } else {
                *snapshot = SessionSnapshot::default();
                true
            }
        });
    }
}

// ─── Navigation Guard ────────────────────────────────────────

/// Navigation metadata attached to a route.
#[derive(Debug, Clone, Default)]
pub struct RouteMeta {
    /// Route only makes sense for signed-out visitors (e.g. login)
    pub guest_only: bool,
    pub requires_auth: bool,
    pub requires_group: Option<String>,
}

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// Send to the login view, remembering the intended destination.
    RedirectToLogin { redirect: String },
    RedirectToDashboard,
}

/// Gate a navigation against the current session snapshot.
pub fn guard_route(
    snapshot: &SessionSnapshot,
    meta: &RouteMeta,
    destination: &str,
) -> RouteDecision {
    if meta.guest_only && snapshot.is_authenticated() {
        return RouteDecision::RedirectToDashboard;
    }

    if meta.requires_auth && !snapshot.is_authenticated() {
        return RouteDecision::RedirectToLogin {
            redirect: destination.to_string(),
        };
    }

    if let Some(group) = &meta.requires_group {
        if !snapshot.is_authenticated() || !snapshot.in_group(group) {
            return RouteDecision::RedirectToDashboard;
        }
    }

    RouteDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, groups: &[&str]) -> SessionUser {
        SessionUser {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
            display_name: None,
            photo_url: None,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn initialize_resolves_on_first_event_and_keeps_listening() {
        let controller = SessionController::new();
        let (tx, rx) = mpsc::channel(4);

        tx.send(AuthEvent::SignedOut).await.unwrap();
        controller.initialize(rx).await;
        assert!(!controller.snapshot().is_authenticated());

        // The listener stays attached after initialization resolved.
        let mut updates = controller.subscribe();
        tx.send(AuthEvent::SignedIn(user("u1", &["member"])))
            .await
            .unwrap();
        updates.changed().await.unwrap();

        let snapshot = controller.snapshot();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.status, SessionStatus::Member);
        assert_eq!(snapshot.groups, vec!["member"]);
    }

    #[tokio::test]
    async fn initialize_is_single_flight() {
        let controller = SessionController::new();
        let (tx, rx) = mpsc::channel(4);

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.initialize(rx).await })
        };
        let second = {
            let controller = controller.clone();
            // Second call must not attach another listener; its receiver
            // argument is a fresh dead channel.
            let (_unused_tx, unused_rx) = mpsc::channel(1);
            tokio::spawn(async move { controller.initialize(unused_rx).await })
        };

        tx.send(AuthEvent::SignedIn(user("u1", &["member"])))
            .await
            .unwrap();

        first.await.unwrap();
        second.await.unwrap();
        assert!(controller.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn apply_twice_is_idempotent() {
        let controller = SessionController::new();

        controller.apply_sign_in(user("u1", &["member", "admin"]));
        controller.apply_sign_in(user("u1", &["member", "admin"]));
        assert_eq!(controller.snapshot().groups, vec!["member", "admin"]);

        controller.apply_sign_out();
        controller.apply_sign_out();
        let snapshot = controller.snapshot();
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.status, SessionStatus::Guest);
        assert!(snapshot.groups.is_empty());
    }

    #[test]
    fn guard_redirects_guests_to_login_with_destination() {
        let snapshot = SessionSnapshot::default();
        let meta = RouteMeta {
            requires_auth: true,
            ..Default::default()
        };

        assert_eq!(
            guard_route(&snapshot, &meta, "/dashboard"),
            RouteDecision::RedirectToLogin {
                redirect: "/dashboard".to_string()
            }
        );
    }

    #[test]
    fn guard_sends_authenticated_users_away_from_guest_routes() {
        let controller = SessionController::new();
        controller.apply_sign_in(user("u1", &["member"]));

        let meta = RouteMeta {
            guest_only: true,
            ..Default::default()
        };

        assert_eq!(
            guard_route(&controller.snapshot(), &meta, "/login"),
            RouteDecision::RedirectToDashboard
        );
    }

    #[test]
    fn guard_enforces_group_membership() {
        let controller = SessionController::new();
        controller.apply_sign_in(user("u1", &["member"]));

        let meta = RouteMeta {
            requires_auth: true,
            requires_group: Some("admin".to_string()),
            ..Default::default()
        };

        assert_eq!(
            guard_route(&controller.snapshot(), &meta, "/devs"),
            RouteDecision::RedirectToDashboard
        );

        controller.apply_sign_in(user("u1", &["member", "admin"]));
        assert_eq!(
            guard_route(&controller.snapshot(), &meta, "/devs"),
            RouteDecision::Allow
        );
    }

    #[test]
    fn guard_allows_plain_routes() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(
            guard_route(&snapshot, &RouteMeta::default(), "/"),
            RouteDecision::Allow
        );
    }
}
