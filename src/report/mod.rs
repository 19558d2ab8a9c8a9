//! Report view and editing
//!
//! Holds the currently mounted report fragment, its editability state, and
//! the display timestamp. Every mutation, whether a wholesale replacement
//! after an upload or a caregiver edit, flows through one commit path that
//! stamps the time and notifies observers, so the timestamp invariant holds
//! regardless of mutation source.

pub mod markdown;
pub mod render;

pub use render::{DisplayFragment, MarkdownEngine, Renderer};

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::watch;

/// Display timestamp format, e.g. `2026/08/26 14:03:05`
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Attempted to edit the report while it was locked
#[derive(Debug, Error)]
#[error("report is locked; enter edit mode first")]
pub struct EditLocked;

/// The mounted report: fragment, editability flag, display timestamp
pub struct ReportView {
    fragment: DisplayFragment,
    locked: bool,
    last_updated: DateTime<Local>,
    revision: u64,
    changed_tx: watch::Sender<u64>,
}

impl ReportView {
    pub fn new() -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            fragment: DisplayFragment {
                html: String::new(),
                text: String::new(),
            },
            locked: true,
            last_updated: Local::now(),
            revision: 0,
            changed_tx,
        }
    }

    /// Observe content changes; the value is the current revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed_tx.subscribe()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn html(&self) -> &str {
        &self.fragment.html
    }

    pub fn plain_text(&self) -> &str {
        &self.fragment.text
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_updated(&self) -> DateTime<Local> {
        self.last_updated
    }

    /// The "last updated" marker shown next to the report
    pub fn display_timestamp(&self) -> String {
        self.last_updated.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Replace the mounted fragment wholesale (after a successful upload)
    pub fn replace(&mut self, fragment: DisplayFragment) {
        self.fragment = fragment;
        self.commit();
    }

    /// Make the report user-editable in place
    pub fn enter_edit(&mut self) {
        self.locked = false;
    }

    /// Lock the report again and refresh the display timestamp
    pub fn save(&mut self) {
        self.locked = true;
        self.commit();
    }

    /// Apply a caregiver edit; only permitted while unlocked
    pub fn apply_edit(&mut self, new_text: &str) -> Result<(), EditLocked> {
        if self.locked {
            return Err(EditLocked);
        }
        self.fragment = DisplayFragment {
            html: markdown::escape_html(new_text).replace('\n', "<br>"),
            text: new_text.to_string(),
        };
        self.commit();
        Ok(())
    }

    /// The single mutation commit path: bump the revision, stamp the time,
    /// notify observers.
    fn commit(&mut self) {
        self.revision += 1;
        self.last_updated = Local::now();
        self.changed_tx.send_replace(self.revision);
    }
}

impl Default for ReportView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(html: &str, text: &str) -> DisplayFragment {
        DisplayFragment {
            html: html.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_view_starts_locked_and_empty() {
        let view = ReportView::new();
        assert!(view.is_locked());
        assert!(view.html().is_empty());
        assert_eq!(view.revision(), 0);
    }

    #[test]
    fn test_edit_rejected_while_locked() {
        let mut view = ReportView::new();
        assert!(view.apply_edit("changed").is_err());
        assert_eq!(view.revision(), 0);
        assert!(view.plain_text().is_empty());
    }

    #[test]
    fn test_edit_flow_unlock_apply_save() {
        let mut view = ReportView::new();
        view.enter_edit();
        assert!(!view.is_locked());

        view.apply_edit("第一行\n第二行").expect("unlocked edit");
        assert_eq!(view.plain_text(), "第一行\n第二行");
        assert_eq!(view.html(), "第一行<br>第二行");

        let revision_before_save = view.revision();
        view.save();
        assert!(view.is_locked());
        assert_eq!(view.revision(), revision_before_save + 1);
    }

    #[test]
    fn test_replace_refreshes_timestamp_and_notifies() {
        let mut view = ReportView::new();
        let mut changes = view.subscribe();
        let before = view.last_updated();

        view.replace(fragment("<p>ok</p>", "ok"));
        assert_eq!(view.revision(), 1);
        assert!(view.last_updated() >= before);
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);
    }

    #[test]
    fn test_every_mutation_source_bumps_revision() {
        let mut view = ReportView::new();
        view.replace(fragment("<p>a</p>", "a"));
        view.enter_edit();
        view.apply_edit("b").unwrap();
        view.save();
        // replace + edit + save, each through the same commit path
        assert_eq!(view.revision(), 3);
    }

    #[test]
    fn test_display_timestamp_format() {
        let view = ReportView::new();
        let stamp = view.display_timestamp();
        // YYYY/MM/DD HH:MM:SS
        assert_eq!(stamp.len(), 19);
        assert_eq!(&stamp[4..5], "/");
        assert_eq!(&stamp[13..14], ":");
    }
}
