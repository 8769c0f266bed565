//! Intel State: the small piece of mutable runtime configuration the apply
//! pipeline consults for its backlog/cooldown gates and records its own
//! completion timestamp into.
//!
//! Deliberately not cached process-wide: every apply invocation re-reads
//! `memory/intel-state.json` from disk immediately before gating, so a
//! concurrent edit to the budget (or a previous apply's `last_apply_ts`)
//! is always seen fresh (spec.md §9 design note).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::CairnError;

const DEFAULT_BACKLOG_LIMIT: u32 = 30;
const DEFAULT_COOLDOWN_DAYS: u32 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalBudget {
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: u32,
}

fn default_backlog_limit() -> u32 {
    DEFAULT_BACKLOG_LIMIT
}

impl Default for ProposalBudget {
    fn default() -> Self {
        ProposalBudget {
            backlog_limit: DEFAULT_BACKLOG_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelState {
    /// ISO-8601 UTC timestamp of the last committed apply, e.g.
    /// `2026-02-13T09:00:00Z`. `None` on a fresh workspace.
    #[serde(default)]
    pub last_apply_ts: Option<String>,
    #[serde(default)]
    pub proposal_budget: ProposalBudget,
    #[serde(default = "default_cooldown_days")]
    pub defer_cooldown_days: u32,
    /// Opaque operator-set mode string; Cairn reads but never interprets it.
    #[serde(default)]
    pub self_correcting_mode: String,
}

fn default_cooldown_days() -> u32 {
    DEFAULT_COOLDOWN_DAYS
}

impl Default for IntelState {
    fn default() -> Self {
        IntelState {
            last_apply_ts: None,
            proposal_budget: ProposalBudget::default(),
            defer_cooldown_days: DEFAULT_COOLDOWN_DAYS,
            self_correcting_mode: String::new(),
        }
    }
}

impl IntelState {
    /// Read `memory/intel-state.json` under `root`, or the default state if
    /// the file is absent (a fresh workspace has no history yet).
    pub fn load(root: &Path) -> Result<IntelState, CairnError> {
        let path = root.join("memory").join("intel-state.json");
        if !path.exists() {
            return Ok(IntelState::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let state: IntelState = serde_json::from_str(&text)?;
        Ok(state)
    }

    /// Persist the state back to `memory/intel-state.json`, creating the
    /// `memory/` directory if this is the first write to a fresh workspace.
    pub fn save(&self, root: &Path) -> Result<(), CairnError> {
        let dir = root.join("memory");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("intel-state.json");
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Record a completed apply at `now` and persist.
    pub fn record_apply(&mut self, root: &Path, now: DateTime<Utc>) -> Result<(), CairnError> {
        self.last_apply_ts = Some(now.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        self.save(root)
    }

    /// Minutes remaining in the no-touch window, or `None` if it's clear.
    /// `last_apply_ts` that fails to parse is treated as no prior apply —
    /// mirroring the original's `except (ValueError, TypeError): pass`.
    pub fn no_touch_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let last_ts = self.last_apply_ts.as_ref()?;
        let last = parse_iso(last_ts)?;
        let elapsed = now.signed_duration_since(last);
        let window = chrono::Duration::minutes(10);
        if elapsed < window {
            Some(window - elapsed)
        } else {
            None
        }
    }
}

/// Parse an ISO-8601 timestamp, tolerating both a trailing `Z` and an
/// explicit offset.
pub(crate) fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = s.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_missing() {
        let td = tempdir().unwrap();
        let state = IntelState::load(td.path()).unwrap();
        assert_eq!(state.proposal_budget.backlog_limit, DEFAULT_BACKLOG_LIMIT);
        assert_eq!(state.defer_cooldown_days, DEFAULT_COOLDOWN_DAYS);
        assert!(state.last_apply_ts.is_none());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let td = tempdir().unwrap();
        let mut state = IntelState::default();
        let now: DateTime<Utc> = "2026-02-13T09:00:00Z".parse().unwrap();
        state.record_apply(td.path(), now).unwrap();
        let reloaded = IntelState::load(td.path()).unwrap();
        assert_eq!(reloaded.last_apply_ts.as_deref(), Some("2026-02-13T09:00:00Z"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let td = tempdir().unwrap();
        std::fs::create_dir_all(td.path().join("memory")).unwrap();
        std::fs::write(
            td.path().join("memory/intel-state.json"),
            r#"{"last_apply_ts": "2026-02-13T09:00:00Z"}"#,
        )
        .unwrap();
        let state = IntelState::load(td.path()).unwrap();
        assert_eq!(state.last_apply_ts.as_deref(), Some("2026-02-13T09:00:00Z"));
        assert_eq!(state.proposal_budget.backlog_limit, DEFAULT_BACKLOG_LIMIT);
        assert_eq!(state.defer_cooldown_days, DEFAULT_COOLDOWN_DAYS);
    }

    #[test]
    fn no_touch_window_blocks_immediately_after_apply() {
        let mut state = IntelState::default();
        let applied_at: DateTime<Utc> = "2026-02-13T09:00:00Z".parse().unwrap();
        state.last_apply_ts = Some(applied_at.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        let now = applied_at + chrono::Duration::minutes(4);
        let remaining = state.no_touch_remaining(now).expect("still in window");
        assert_eq!(remaining.num_minutes(), 6);
    }

    #[test]
    fn no_touch_window_clears_after_ten_minutes() {
        let mut state = IntelState::default();
        let applied_at: DateTime<Utc> = "2026-02-13T09:00:00Z".parse().unwrap();
        state.last_apply_ts = Some(applied_at.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        let now = applied_at + chrono::Duration::minutes(11);
        assert!(state.no_touch_remaining(now).is_none());
    }
}
