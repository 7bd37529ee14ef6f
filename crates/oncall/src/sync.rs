//! Roster → chat user group synchronisation.
//!
//! A one-shot pass that makes each configured user group (e.g.
//! `@devops-duty`) contain exactly the people currently on call, plus a
//! static list of extra members. Every group is handled on its own; one
//! failing group never stops the others.

use anyhow::{Context, Result};
use notify::UserGroups;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::roster::DutyRoster;

/// One user group to keep in sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// User group handle, without the `@`
    pub group: String,
    /// Backend schedule whose on-call participants fill the group
    pub schedule: String,
    /// Roster handles that are always members
    pub extra: Vec<String>,
}

/// What happened to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Updated { members: usize },
    /// Nobody could be resolved, the group was left untouched
    Skipped,
}

/// Summary of a sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Synchronises user groups from the duty roster.
pub struct GroupSync {
    roster: DutyRoster,
    groups: Arc<dyn UserGroups>,
}

impl GroupSync {
    #[must_use]
    pub fn new(roster: DutyRoster, groups: Arc<dyn UserGroups>) -> Self {
        Self { roster, groups }
    }

    /// Sync every target and report the outcome per group.
    pub async fn run(&self, targets: &[SyncTarget]) -> SyncReport {
        let mut report = SyncReport::default();

        for target in targets {
            match self.sync_group(target).await {
                Ok(SyncStatus::Updated { members }) => {
                    info!(group = %target.group, schedule = %target.schedule, members, "User group updated");
                    report.updated.push(target.group.clone());
                }
                Ok(SyncStatus::Skipped) => {
                    warn!(group = %target.group, schedule = %target.schedule, "Nobody is on duty, user group left untouched");
                    report.skipped.push(target.group.clone());
                }
                Err(e) => {
                    error!(group = %target.group, schedule = %target.schedule, error = %format!("{e:#}"), "User group sync failed");
                    report.failed.push(target.group.clone());
                }
            }
        }

        report
    }

    async fn sync_group(&self, target: &SyncTarget) -> Result<SyncStatus> {
        let mut handles = self
            .roster
            .handles(&target.schedule)
            .await
            .with_context(|| format!("Failed to read on-call for schedule {}", target.schedule))?;
        handles.extend(target.extra.iter().cloned());

        let mut members = self.roster.translate(&handles).await;
        dedup_in_order(&mut members);

        if members.is_empty() {
            return Ok(SyncStatus::Skipped);
        }

        let group_id = self
            .groups
            .group_id(&target.group)
            .await
            .context("Failed to list user groups")?
            .with_context(|| format!("User group @{} does not exist", target.group))?;

        self.groups
            .replace_members(&group_id, &members)
            .await
            .with_context(|| format!("Failed to update user group @{}", target.group))?;

        Ok(SyncStatus::Updated {
            members: members.len(),
        })
    }
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
