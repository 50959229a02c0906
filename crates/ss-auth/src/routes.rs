//! Route table and navigation context
//!
//! Routes are data: each pattern is public, guarded, or guarded and role-gated.
//! [`NavigationContext`] re-evaluates the current path whenever the session settles.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use ss_common::Role;
use ss_config::RoutesConfig;
use tokio::sync::watch;
use tracing::debug;

use crate::error::Result;
use crate::guard::{canonical_path, GuardDecision, Redirect, RoleGate, RouteGuard};
use crate::session::{SessionSnapshot, SessionState};

/// Access requirement of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "access", content = "role", rename_all = "snake_case")]
pub enum RouteAccess {
    Public,
    /// Route Guard only
    Private,
    /// Route Guard, then a Role Gate for this role
    Gated(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct RouteEntry {
    pattern: String,
    segments: Vec<Segment>,
    access: RouteAccess,
}

impl RouteEntry {
    fn new(pattern: &str, access: RouteAccess) -> Self {
        let segments = split_path(pattern)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
            access,
        }
    }

    fn matches(&self, segments: &[&str]) -> Option<BTreeMap<String, String>> {
        if segments.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (expected, actual) in self.segments.iter().zip(segments) {
            match expected {
                Segment::Literal(literal) if literal == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }
}

/// A path resolved against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub pattern: String,
    pub access: RouteAccess,
    pub params: BTreeMap<String, String>,
}

/// Ordered route patterns; the first match wins
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(self, pattern: &str) -> Self {
        self.route(pattern, RouteAccess::Public)
    }

    pub fn private(self, pattern: &str) -> Self {
        self.route(pattern, RouteAccess::Private)
    }

    pub fn gated(self, pattern: &str, role: Role) -> Self {
        self.route(pattern, RouteAccess::Gated(role))
    }

    pub fn route(mut self, pattern: &str, access: RouteAccess) -> Self {
        self.entries.push(RouteEntry::new(pattern, access));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let path = canonical_path(path);
        let segments: Vec<&str> = split_path(&path).collect();

        self.entries.iter().find_map(|entry| {
            entry.matches(&segments).map(|params| RouteMatch {
                pattern: entry.pattern.clone(),
                access: entry.access,
                params,
            })
        })
    }

    /// The study-session platform's route tree
    pub fn study_platform() -> Self {
        Self::new()
            .public("/")
            .public("/sign_in")
            .public("/sign_up")
            .public("/admin_access")
            .public("/not_found")
            .private("/session_detail/:id")
            .private("/payment")
            .private("/payment_confirmation")
            .private("/dashboard")
            .private("/dashboard/booked_session")
            .private("/dashboard/create_note")
            .private("/dashboard/manage_notes")
            .private("/dashboard/view_study_materials")
            .private("/dashboard/profile")
            .gated("/dashboard/create_study_session", Role::Tutor)
            .gated("/dashboard/view_all_study_sessions", Role::Tutor)
            .gated("/dashboard/upload_material", Role::Tutor)
            .gated("/dashboard/view_materials", Role::Tutor)
            .gated("/dashboard/update-material/:id", Role::Tutor)
            .gated("/dashboard/create-announcement", Role::Admin)
            .gated("/dashboard/manage_users", Role::Admin)
            .gated("/dashboard/manage_study_sessions", Role::Admin)
            .gated("/dashboard/update-study-session/:sessionId", Role::Admin)
            .gated("/dashboard/manage_materials", Role::Admin)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Evaluates a path against the route table, guard and role gates
#[derive(Debug, Clone)]
pub struct Navigator {
    table: RouteTable,
    guard: RouteGuard,
}

impl Navigator {
    pub fn new(table: RouteTable, guard: RouteGuard) -> Self {
        Self { table, guard }
    }

    pub fn from_config(config: &RoutesConfig) -> Result<Self> {
        Ok(Self::new(RouteTable::study_platform(), RouteGuard::from_config(config)?))
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn evaluate(&self, state: &SessionState, path: &str) -> GuardDecision {
        let path = canonical_path(path);
        let Some(route) = self.table.resolve(&path) else {
            return GuardDecision::RedirectTo(Redirect::to(&self.guard.targets().not_found));
        };

        match route.access {
            RouteAccess::Public => GuardDecision::Allow,
            RouteAccess::Private => self.guard.decide(state, &path),
            RouteAccess::Gated(role) => match self.guard.decide(state, &path) {
                GuardDecision::Allow => RoleGate::for_role(role, self.guard.targets()).decide(state),
                other => other,
            },
        }
    }
}

/// The current path plus a live view of the session.
///
/// Decisions are recomputed on navigation and on each session settlement.
pub struct NavigationContext {
    navigator: Arc<Navigator>,
    session: watch::Receiver<SessionSnapshot>,
    path: String,
}

impl NavigationContext {
    pub fn new(navigator: Arc<Navigator>, session: watch::Receiver<SessionSnapshot>, path: impl Into<String>) -> Self {
        Self {
            navigator,
            session,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn decision(&self) -> GuardDecision {
        let snapshot = self.session.borrow();
        self.navigator.evaluate(&snapshot.state, &self.path)
    }

    /// Move to `path` and evaluate against the current session
    pub fn navigate(&mut self, path: impl Into<String>) -> GuardDecision {
        self.path = path.into();
        let decision = self.decision();
        debug!(path = %self.path, ?decision, "Navigation evaluated");
        decision
    }

    /// Wait for the next settled session state and re-evaluate.
    ///
    /// Returns `None` once the session store is gone.
    pub async fn next(&mut self) -> Option<GuardDecision> {
        loop {
            self.session.changed().await.ok()?;
            if self.session.borrow_and_update().state.is_settled() {
                break;
            }
        }
        Some(self.decision())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::RedirectTargets;
    use chrono::Utc;
    use ss_common::Identity;

    fn navigator() -> Navigator {
        Navigator::from_config(&RoutesConfig::default()).unwrap()
    }

    fn signed_in(role: Role) -> SessionState {
        SessionState::Authenticated(Identity {
            uid: "uid-7".to_string(),
            email: "sam@example.com".to_string(),
            display_name: None,
            photo_url: None,
            role,
        })
    }

    fn snapshot(generation: u64, state: SessionState) -> SessionSnapshot {
        SessionSnapshot {
            generation,
            state,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_param_segments_match() {
        let table = RouteTable::study_platform();

        let route = table.resolve("/dashboard/update-study-session/abc123").unwrap();
        assert_eq!(route.pattern, "/dashboard/update-study-session/:sessionId");
        assert_eq!(route.access, RouteAccess::Gated(Role::Admin));
        assert_eq!(route.params.get("sessionId").map(String::as_str), Some("abc123"));

        let route = table.resolve("/session_detail/42?tab=reviews").unwrap();
        assert_eq!(route.params.get("id").map(String::as_str), Some("42"));

        assert!(table.resolve("/session_detail").is_none());
        assert!(table.resolve("/dashboard/nope").is_none());
        assert_eq!(table.resolve("/dashboard/").unwrap().pattern, "/dashboard");
    }

    #[test]
    fn test_unmatched_path_goes_to_not_found() {
        let decision = navigator().evaluate(&signed_in(Role::Admin), "/no/such/page");
        assert_eq!(decision, GuardDecision::RedirectTo(Redirect::to("/not_found")));
    }

    #[test]
    fn test_public_routes_never_wait() {
        let navigator = navigator();
        for path in ["/", "/sign_in", "/sign_up", "/admin_access"] {
            assert_eq!(navigator.evaluate(&SessionState::Loading, path), GuardDecision::Allow);
        }
    }

    #[test]
    fn test_gated_routes() {
        let navigator = navigator();
        let path = "/dashboard/upload_material";

        assert_eq!(navigator.evaluate(&signed_in(Role::Tutor), path), GuardDecision::Allow);
        assert_eq!(
            navigator.evaluate(&signed_in(Role::Student), path),
            GuardDecision::RedirectTo(Redirect::to("/dashboard"))
        );
        assert_eq!(navigator.evaluate(&SessionState::Loading, path), GuardDecision::Wait);
        assert_eq!(
            navigator.evaluate(&SessionState::Anonymous, path),
            GuardDecision::RedirectTo(Redirect::to("/sign_in").with_return_to(path))
        );
    }

    #[test]
    fn test_private_route_with_policy() {
        let navigator = navigator();
        assert_eq!(
            navigator.evaluate(&signed_in(Role::Tutor), "/dashboard/booked_session"),
            GuardDecision::RedirectTo(Redirect::to("/not_found"))
        );
        assert!(navigator.evaluate(&signed_in(Role::Tutor), "/dashboard/profile").is_allowed());
    }

    #[test]
    fn test_non_canonical_paths_keep_policy() {
        let navigator = navigator();
        let tutor = signed_in(Role::Tutor);

        for path in [
            "/dashboard/booked_session",
            "/dashboard/booked_session/",
            "//dashboard/booked_session",
            "/dashboard//booked_session",
        ] {
            assert_eq!(
                navigator.evaluate(&tutor, path),
                GuardDecision::RedirectTo(Redirect::to("/not_found")),
                "{}",
                path
            );
        }

        assert!(navigator.evaluate(&signed_in(Role::Student), "/dashboard//booked_session/").is_allowed());
        assert_eq!(
            navigator.evaluate(&SessionState::Anonymous, "//dashboard/profile/"),
            GuardDecision::RedirectTo(Redirect::to("/sign_in").with_return_to("/dashboard/profile"))
        );
    }

    #[tokio::test]
    async fn test_context_reevaluates_on_settlement() {
        let (tx, rx) = watch::channel(snapshot(1, SessionState::Loading));
        let navigator = Arc::new(Navigator::new(RouteTable::study_platform(), RouteGuard::default()));
        let mut context = NavigationContext::new(navigator, rx, "/");

        assert_eq!(context.navigate("/dashboard/booked_session"), GuardDecision::Wait);

        tx.send_replace(snapshot(1, signed_in(Role::Student)));
        assert_eq!(context.next().await, Some(GuardDecision::Allow));

        tx.send_replace(snapshot(2, SessionState::Loading));
        tx.send_replace(snapshot(2, SessionState::Anonymous));
        assert_eq!(
            context.next().await,
            Some(GuardDecision::RedirectTo(Redirect::to("/not_found")))
        );

        drop(tx);
        assert_eq!(context.next().await, None);
    }

    #[tokio::test]
    async fn test_context_skips_loading_updates() {
        let (tx, rx) = watch::channel(snapshot(0, SessionState::Unknown));
        let targets = RedirectTargets::default();
        let navigator = Arc::new(Navigator::new(
            RouteTable::study_platform(),
            RouteGuard::new(Default::default(), targets),
        ));
        let mut context = NavigationContext::new(navigator, rx, "/dashboard/profile");

        let waiter = tokio::spawn(async move { context.next().await });
        tx.send_replace(snapshot(1, SessionState::Loading));
        tokio::task::yield_now().await;
        tx.send_replace(snapshot(1, SessionState::Anonymous));

        let decision = waiter.await.unwrap();
        assert_eq!(
            decision,
            Some(GuardDecision::RedirectTo(Redirect::to("/sign_in").with_return_to("/dashboard/profile")))
        );
    }
}
