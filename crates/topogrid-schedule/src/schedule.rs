//! NodeSchedule — the ordered action list owned by one node.
//!
//! Entries keep insertion order; the consuming agent orders by start time.
//! Deferred content is generated by [`NodeSchedule::resolve`], which runs
//! each generator at most once no matter how often it is called.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::entry::ScheduleEntry;
use crate::error::ScheduleResult;
use crate::transport::{self, TransportEntry};

#[derive(Debug, Default)]
pub struct NodeSchedule {
    entries: Vec<ScheduleEntry>,
}

/// Entries sharing one start time, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSlot {
    pub start_time: f64,
    pub entries: Vec<TransportEntry>,
}

impl NodeSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Ordering by start time is not enforced.
    pub fn add(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    /// Append several entries, keeping their relative order.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ScheduleEntry>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// True when every entry's content is concrete.
    pub fn is_resolved(&self) -> bool {
        self.entries.iter().all(ScheduleEntry::is_materialized)
    }

    /// Generate all deferred content. Returns how many generators ran.
    ///
    /// Entries already materialized are skipped, so a second call is a
    /// no-op.
    pub fn resolve(&mut self) -> ScheduleResult<usize> {
        let mut invoked = 0;
        for entry in &mut self.entries {
            invoked += entry.resolve()?;
        }
        if invoked > 0 {
            debug!(invoked, entries = self.entries.len(), "schedule content generated");
        }
        Ok(invoked)
    }

    /// Resolve, then normalize every entry into its transport record.
    pub fn to_transport(&mut self) -> ScheduleResult<Vec<TransportEntry>> {
        self.resolve()?;
        self.entries.iter().map(ScheduleEntry::to_transport).collect()
    }

    /// Resolve and encode for upload.
    pub fn encode(&mut self) -> ScheduleResult<Vec<u8>> {
        let entries = self.to_transport()?;
        transport::encode(&entries)
    }

    /// Resource file names referenced anywhere in the schedule.
    pub fn required_resources(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|e| e.required_files())
            .map(str::to_string)
            .collect()
    }

    /// Entries grouped by start time, ascending.
    pub fn timeline(&mut self) -> ScheduleResult<Vec<TimelineSlot>> {
        let mut entries = self.to_transport()?;
        entries.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut slots: Vec<TimelineSlot> = Vec::new();
        for entry in entries {
            match slots.last_mut() {
                Some(slot) if slot.start_time == entry.start_time => slot.entries.push(entry),
                _ => slots.push(TimelineSlot {
                    start_time: entry.start_time,
                    entries: vec![entry],
                }),
            }
        }
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use topo_core::OsFamily;

    use super::*;
    use crate::content::Content;
    use crate::error::ScheduleError;
    use crate::transport::{DataItem, decode};

    fn counting_content(calls: &Arc<AtomicUsize>) -> Content {
        let calls = Arc::clone(calls);
        Content::deferred(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("generated".to_string())
        })
    }

    #[test]
    fn resolve_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut schedule = NodeSchedule::new();
        schedule.add(
            ScheduleEntry::drop_content(1.0, "/tmp/a.txt", counting_content(&calls), false).unwrap(),
        );
        schedule.add(
            ScheduleEntry::drop_content(2.0, "/tmp/b.txt", counting_content(&calls), false).unwrap(),
        );
        schedule.add(ScheduleEntry::run_executable(3.0, "/bin/true", None, false).unwrap());

        let first = schedule.to_transport().unwrap();
        let second = schedule.to_transport().unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(schedule.resolve().unwrap(), 0);
    }

    #[test]
    fn failing_generator_surfaces_location() {
        let mut schedule = NodeSchedule::new();
        schedule.add(
            ScheduleEntry::drop_content(
                1.0,
                "/etc/motd.txt",
                Content::deferred(|| Err("template missing".into())),
                false,
            )
            .unwrap(),
        );
        let err = schedule.resolve().unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::ContentGeneration { ref location, .. } if location == "/etc/motd.txt"
        ));
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let mut schedule = NodeSchedule::new();
        schedule.add(ScheduleEntry::pause(f64::NEG_INFINITY, 2.5).unwrap());
        schedule.add(ScheduleEntry::breakpoint(f64::INFINITY).unwrap());
        schedule.add(
            ScheduleEntry::drop_content(-10.0, "/root/notes.txt", Content::literal("hi"), true)
                .unwrap(),
        );
        schedule.add(
            ScheduleEntry::file_transfer("/var/log/auth.log", Some(60.0), 1.0, Some("logs"), true)
                .unwrap(),
        );

        let expected = schedule.to_transport().unwrap();
        let decoded = decode(&schedule.encode().unwrap()).unwrap();
        assert_eq!(decoded, expected);
        assert_eq!(decoded[0].start_time, f64::NEG_INFINITY);
        assert_eq!(decoded[1].start_time, f64::INFINITY);
        assert_eq!(
            decoded[3].data[0],
            DataItem::Transfer {
                location: "/var/log/auth.log".into(),
                interval: Some(60.0),
                destination: Some("logs".into()),
                only_if_changed: true,
            }
        );
    }

    #[test]
    fn preload_adds_exactly_two_entries_at_same_time() {
        let mut schedule = NodeSchedule::new();
        schedule.extend(
            ScheduleEntry::preloaded_content(
                -5.0,
                "/opt/run.sh",
                Content::literal("#!/bin/sh\n"),
                true,
                OsFamily::Unix,
            )
            .unwrap(),
        );
        assert_eq!(schedule.len(), 2);
        let entries = schedule.to_transport().unwrap();
        assert_eq!(entries[0].start_time, entries[1].start_time);
    }

    #[test]
    fn timeline_groups_by_start_time() {
        let mut schedule = NodeSchedule::new();
        schedule.add(ScheduleEntry::run_executable(10.0, "b", None, false).unwrap());
        schedule.add(ScheduleEntry::run_executable(-1.0, "a", None, false).unwrap());
        schedule.add(ScheduleEntry::run_executable(10.0, "c", None, false).unwrap());

        let timeline = schedule.timeline().unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].start_time, -1.0);
        assert_eq!(timeline[1].entries.len(), 2);
        assert_eq!(timeline[1].entries[0].executable.as_deref(), Some("b"));
    }

    #[test]
    fn required_resources_are_collected() {
        let mut schedule = NodeSchedule::new();
        schedule.add(ScheduleEntry::drop_file(1.0, "/tmp/x.tar", "x.tar", false).unwrap());
        schedule.add(ScheduleEntry::run_executable(2.0, "install.sh", None, true).unwrap());
        schedule.add(ScheduleEntry::drop_file(3.0, "/tmp/y.tar", "x.tar", false).unwrap());
        let required: Vec<_> = schedule.required_resources().into_iter().collect();
        assert_eq!(required, vec!["install.sh".to_string(), "x.tar".to_string()]);
    }
}
