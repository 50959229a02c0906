//! Route Guard and Role Gate
//!
//! Pure decision functions over settled session state. Evaluation order:
//! 1. Unsettled state (`Unknown`/`Loading`) waits; never allow or redirect.
//! 2. A path with a required role redirects to not-found on mismatch.
//! 3. `Anonymous` redirects to sign-in, carrying the requested path.
//! 4. Otherwise allow.
//!
//! A Role Gate is rule 2 for one fixed role, redirecting to the dashboard root.

use std::collections::HashMap;

use serde::Serialize;
use ss_common::Role;
use ss_config::RoutesConfig;

use crate::error::{AuthError, Result};
use crate::session::SessionState;

/// Where to send a navigation that may not proceed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub target: String,
    /// Path to return to after signing in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

impl Redirect {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            return_to: None,
        }
    }

    pub fn with_return_to(mut self, path: impl Into<String>) -> Self {
        self.return_to = Some(path.into());
        self
    }
}

/// Outcome of a guard evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session not settled yet: render nothing decisive
    Wait,
    Allow,
    RedirectTo(Redirect),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            GuardDecision::RedirectTo(redirect) => Some(redirect),
            _ => None,
        }
    }
}

/// Sparse path → required role table. Absent paths accept any signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    rules: HashMap<String, Role>,
}

impl RoutePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, path: &str, role: Role) -> Self {
        self.rules.insert(canonical_path(path), role);
        self
    }

    /// Lookup is by canonical path, so `/a//b/` and `/a/b` share one rule
    pub fn required_role(&self, path: &str) -> Option<Role> {
        self.rules.get(&canonical_path(path)).copied()
    }

    pub fn from_config(config: &RoutesConfig) -> Result<Self> {
        let mut rules = HashMap::with_capacity(config.policy.len());
        for (path, role) in &config.policy {
            let role = role
                .parse::<Role>()
                .map_err(|e| AuthError::Config(format!("routes.policy[{}]: {}", path, e)))?;
            rules.insert(canonical_path(path), role);
        }
        Ok(Self { rules })
    }
}

/// Collapse a requested path to `/seg/seg`: query and fragment dropped,
/// empty segments removed.
pub fn canonical_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Where the guard and role gates send a refused navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    pub sign_in: String,
    pub not_found: String,
    pub dashboard_root: String,
}

impl Default for RedirectTargets {
    fn default() -> Self {
        Self::from_config(&RoutesConfig::default())
    }
}

impl RedirectTargets {
    pub fn from_config(config: &RoutesConfig) -> Self {
        Self {
            sign_in: config.sign_in.clone(),
            not_found: config.not_found.clone(),
            dashboard_root: config.dashboard_root.clone(),
        }
    }
}

/// Decide whether `path` may be shown for `state`
pub fn decide(
    state: &SessionState,
    path: &str,
    policy: &RoutePolicy,
    targets: &RedirectTargets,
) -> GuardDecision {
    if !state.is_settled() {
        return GuardDecision::Wait;
    }

    let path = canonical_path(path);
    if let Some(required) = policy.required_role(&path) {
        if state.role() != Some(required) {
            return GuardDecision::RedirectTo(Redirect::to(&targets.not_found));
        }
    }

    if matches!(state, SessionState::Anonymous) {
        return GuardDecision::RedirectTo(Redirect::to(&targets.sign_in).with_return_to(path));
    }

    GuardDecision::Allow
}

/// [`decide`] bundled with its policy and targets
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    policy: RoutePolicy,
    targets: RedirectTargets,
}

impl RouteGuard {
    pub fn new(policy: RoutePolicy, targets: RedirectTargets) -> Self {
        Self { policy, targets }
    }

    pub fn from_config(config: &RoutesConfig) -> Result<Self> {
        Ok(Self::new(RoutePolicy::from_config(config)?, RedirectTargets::from_config(config)))
    }

    pub fn decide(&self, state: &SessionState, path: &str) -> GuardDecision {
        decide(state, path, &self.policy, &self.targets)
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn targets(&self) -> &RedirectTargets {
        &self.targets
    }
}

/// Access check requiring one specific role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    required: Role,
    redirect_to: String,
}

impl RoleGate {
    pub fn new(required: Role, redirect_to: impl Into<String>) -> Self {
        Self {
            required,
            redirect_to: redirect_to.into(),
        }
    }

    /// Gate redirecting to the configured dashboard root
    pub fn for_role(required: Role, targets: &RedirectTargets) -> Self {
        Self::new(required, &targets.dashboard_root)
    }

    pub fn required(&self) -> Role {
        self.required
    }

    pub fn decide(&self, state: &SessionState) -> GuardDecision {
        if !state.is_settled() {
            return GuardDecision::Wait;
        }

        if state.role() == Some(self.required) {
            GuardDecision::Allow
        } else {
            GuardDecision::RedirectTo(Redirect::to(&self.redirect_to))
        }
    }
}

/// Where to go once signed in: the carried return path, or `default`
pub fn post_sign_in_target<'a>(return_to: Option<&'a str>, default: &'a str) -> &'a str {
    match return_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => default,
    }
}
