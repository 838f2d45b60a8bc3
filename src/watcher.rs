//! # Directory watching
//!
//! Each watcher owns a notify watcher whose callback sends raw events over an
//! `mpsc` channel to a collector thread. The collector converts them and
//! appends them to a bounded log shared with the registry. Stopping drops the
//! notify watcher, flags the collector, and joins it once the channel is
//! drained.

use crate::error::{FileOpError, Result};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const COLLECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: WatchEventKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WatchEvent {
    /// Converts a notify event into zero or more file events. Directory and
    /// access events produce nothing.
    pub fn from_notify(event: &Event, timestamp: DateTime<Utc>) -> Vec<WatchEvent> {
        let make = |kind, path: &Path, dest_path: Option<&Path>| WatchEvent {
            kind,
            path: path.display().to_string(),
            dest_path: dest_path.map(|p| p.display().to_string()),
            timestamp,
        };

        let kind = match event.kind {
            EventKind::Access(_) => return Vec::new(),
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
                return Vec::new();
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                return match event.paths.as_slice() {
                    [from, to, ..] if !to.is_dir() => {
                        vec![make(WatchEventKind::Moved, from, Some(to.as_path()))]
                    }
                    _ => Vec::new(),
                };
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => WatchEventKind::Deleted,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Created,
            EventKind::Create(_) => WatchEventKind::Created,
            EventKind::Modify(_) => WatchEventKind::Modified,
            EventKind::Remove(_) => WatchEventKind::Deleted,
            EventKind::Any | EventKind::Other => WatchEventKind::Other,
        };

        event
            .paths
            .iter()
            .filter(|path| !path.is_dir())
            .map(|path| make(kind, path, None))
            .collect()
    }
}

/// A FIFO of events that evicts the oldest entry when full.
#[derive(Debug, Default)]
pub struct EventLog {
    capacity: usize,
    events: VecDeque<WatchEvent>,
    dropped: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: WatchEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<WatchEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

type SharedLog = Arc<Mutex<EventLog>>;

struct ActiveWatcher {
    directory: PathBuf,
    started_at: DateTime<Utc>,
    log: SharedLog,
    watcher: Option<RecommendedWatcher>,
    stop: Arc<AtomicBool>,
    collector: Option<JoinHandle<()>>,
}

impl ActiveWatcher {
    fn start(id: &str, directory: &Path, max_events: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(directory, RecursiveMode::Recursive)?;

        let log: SharedLog = Arc::new(Mutex::new(EventLog::new(max_events)));
        let stop = Arc::new(AtomicBool::new(false));
        let collector = thread::Builder::new()
            .name(format!("watch-{id}"))
            .spawn({
                let log = Arc::clone(&log);
                let stop = Arc::clone(&stop);
                move || collect_events(rx, log, stop)
            })
            .map_err(|e| FileOpError::io("Failed to spawn watcher thread", e))?;

        Ok(Self {
            directory: directory.to_path_buf(),
            started_at: Utc::now(),
            log,
            watcher: Some(watcher),
            stop,
            collector: Some(collector),
        })
    }

    fn events(&self) -> (Vec<WatchEvent>, usize) {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        (log.snapshot(), log.dropped())
    }

    fn event_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn halt(&mut self) {
        // Dropping the notify watcher closes the sending side of the channel.
        self.watcher.take();
        self.stop.store(true, Ordering::SeqCst);
        if let Some(collector) = self.collector.take() {
            if collector.join().is_err() {
                tracing::error!(directory = %self.directory.display(), "watcher thread panicked");
            }
        }
    }
}

impl Drop for ActiveWatcher {
    fn drop(&mut self) {
        self.halt();
    }
}

fn collect_events(rx: Receiver<notify::Result<Event>>, log: SharedLog, stop: Arc<AtomicBool>) {
    loop {
        match rx.recv_timeout(COLLECTOR_POLL_INTERVAL) {
            Ok(Ok(event)) => {
                let converted = WatchEvent::from_notify(&event, Utc::now());
                if converted.is_empty() {
                    continue;
                }
                let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
                for event in converted {
                    log.push(event);
                }
            }
            Ok(Err(e)) => tracing::warn!("Watcher error: {e}"),
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ObserverInfo {
    pub id: String,
    pub directory: String,
    pub started_at: DateTime<Utc>,
    pub event_count: usize,
}

/// All running watchers of a workspace, keyed by observer id. Dropping the
/// registry stops every watcher.
pub struct WatchRegistry {
    max_events: usize,
    watchers: BTreeMap<String, ActiveWatcher>,
}

impl WatchRegistry {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            watchers: BTreeMap::new(),
        }
    }

    pub fn start(&mut self, id: Option<&str>, directory: &Path) -> Result<String> {
        let id = match id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("obs_{}", uuid::Uuid::new_v4().simple()),
        };
        if self.watchers.contains_key(&id) {
            return Err(FileOpError::AlreadyExists(format!(
                "Observer with ID '{id}' already exists"
            )));
        }
        let watcher = ActiveWatcher::start(&id, directory, self.max_events)?;
        self.watchers.insert(id.clone(), watcher);
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<&ActiveWatcher> {
        self.watchers.get(id).ok_or_else(|| unknown_observer(id))
    }

    fn remove(&mut self, id: &str) -> Result<ActiveWatcher> {
        self.watchers.remove(id).ok_or_else(|| unknown_observer(id))
    }

    pub fn list(&self) -> Vec<ObserverInfo> {
        self.watchers
            .iter()
            .map(|(id, watcher)| ObserverInfo {
                id: id.clone(),
                directory: watcher.directory.display().to_string(),
                started_at: watcher.started_at,
                event_count: watcher.event_count(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("max_events", &self.max_events)
            .field("watchers", &self.watchers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unknown_observer(id: &str) -> FileOpError {
    FileOpError::NotFound(format!("Observer with ID '{id}' not found"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchAction {
    Start,
    Events,
    Stop,
    List,
}

impl FromStr for WatchAction {
    type Err = FileOpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(WatchAction::Start),
            "events" => Ok(WatchAction::Events),
            "stop" => Ok(WatchAction::Stop),
            "list" => Ok(WatchAction::List),
            other => Err(FileOpError::InvalidArgument(format!(
                "Invalid action: {other}. Must be one of: 'start', 'stop', 'events', 'list'"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WatchReport {
    pub action: WatchAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<WatchEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_events: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_observers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observers: Option<Vec<ObserverInfo>>,
}

impl WatchReport {
    fn new(action: WatchAction) -> Self {
        Self {
            action,
            directory: None,
            observer_id: None,
            result: None,
            events: None,
            event_count: None,
            dropped_events: None,
            active_observers: None,
            observers: None,
        }
    }

    fn with_events(
        mut self,
        directory: &Path,
        id: &str,
        events: Vec<WatchEvent>,
        dropped: usize,
    ) -> Self {
        self.directory = Some(directory.display().to_string());
        self.observer_id = Some(id.to_string());
        self.event_count = Some(events.len());
        self.events = Some(events);
        self.dropped_events = Some(dropped);
        self
    }
}

/// Starts, inspects, stops or lists directory watchers.
///
/// `events`, `stop` and `list` work on observer ids and ignore the directory.
pub fn watch_directory(
    workspace: &Workspace,
    directory_path: &str,
    action: &str,
    observer_id: Option<&str>,
    use_base_dir: bool,
) -> Result<WatchReport> {
    let action: WatchAction = action.parse()?;
    let mut report = WatchReport::new(action);

    match action {
        WatchAction::Start => {
            let directory = workspace.resolve(directory_path, use_base_dir)?;
            if !directory.is_dir() {
                return Err(FileOpError::not_found("Directory", &directory));
            }
            let id = workspace.watchers().start(observer_id, &directory)?;
            tracing::info!(observer = %id, directory = %directory.display(), "watcher started");

            report.result = Some(format!(
                "Observer started for directory: {}",
                directory.display()
            ));
            report.directory = Some(directory.display().to_string());
            report.observer_id = Some(id);
        }
        WatchAction::Events => {
            let id = require_id(observer_id)?;
            let registry = workspace.watchers();
            let watcher = registry.get(id)?;
            let (events, dropped) = watcher.events();
            report = report.with_events(&watcher.directory, id, events, dropped);
        }
        WatchAction::Stop => {
            let id = require_id(observer_id)?;
            // Release the registry lock before joining the collector thread.
            let mut watcher = workspace.watchers().remove(id)?;
            watcher.halt();
            let (events, dropped) = watcher.events();
            tracing::info!(observer = %id, events = events.len(), "watcher stopped");

            report.result = Some(format!(
                "Observer stopped for directory: {}",
                watcher.directory.display()
            ));
            report = report.with_events(&watcher.directory, id, events, dropped);
        }
        WatchAction::List => {
            let observers = workspace.watchers().list();
            report.active_observers = Some(observers.len());
            report.observers = Some(observers);
        }
    }
    Ok(report)
}

fn require_id(observer_id: Option<&str>) -> Result<&str> {
    observer_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FileOpError::InvalidArgument("An observer_id is required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use std::time::Instant;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, Workspace) {
        let tmp_dir = Builder::new().prefix("test-watch-").tempdir().unwrap();
        fs::create_dir(tmp_dir.path().join("watched")).unwrap();
        let workspace = Workspace::new(tmp_dir.path());
        (tmp_dir, workspace)
    }

    fn event(kind: WatchEventKind, path: &str) -> WatchEvent {
        WatchEvent {
            kind,
            path: path.to_string(),
            dest_path: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_log_is_bounded() {
        let mut log = EventLog::new(2);
        log.push(event(WatchEventKind::Created, "a"));
        log.push(event(WatchEventKind::Modified, "b"));
        log.push(event(WatchEventKind::Deleted, "c"));

        let paths: Vec<_> = log.snapshot().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec!["b", "c"]);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_notify_event_conversion() {
        let now = Utc::now();
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/nope/a.txt"));
        assert!(WatchEvent::from_notify(&access, now).is_empty());

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/nope/a.txt"))
            .add_path(PathBuf::from("/nope/b.txt"));
        let converted = WatchEvent::from_notify(&rename, now);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].kind, WatchEventKind::Moved);
        assert_eq!(converted[0].dest_path.as_deref(), Some("/nope/b.txt"));

        let folder = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/nope/dir"));
        assert!(WatchEvent::from_notify(&folder, now).is_empty());
    }

    #[test]
    fn test_start_events_stop_lifecycle() {
        let (tmp_dir, ws) = setup_workspace();
        let started = watch_directory(&ws, "watched", "start", Some("obs_test"), true).unwrap();
        assert_eq!(started.observer_id.as_deref(), Some("obs_test"));

        let listed = watch_directory(&ws, "", "list", None, true).unwrap();
        assert_eq!(listed.active_observers, Some(1));

        fs::write(tmp_dir.path().join("watched/new.txt"), "hello").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let report = watch_directory(&ws, "", "events", Some("obs_test"), true).unwrap();
            if report.event_count.unwrap_or(0) > 0 || Instant::now() > deadline {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }

        let stopped = watch_directory(&ws, "", "stop", Some("obs_test"), true).unwrap();
        let events = stopped.events.unwrap();
        assert!(events.iter().any(|e| e.path.ends_with("new.txt")));

        let listed = watch_directory(&ws, "", "list", None, true).unwrap();
        assert_eq!(listed.active_observers, Some(0));
    }

    #[test]
    fn test_duplicate_and_unknown_ids() {
        let (_tmp_dir, ws) = setup_workspace();
        let started = watch_directory(&ws, "watched", "start", None, true).unwrap();
        let id = started.observer_id.unwrap();
        assert!(id.starts_with("obs_"));

        let err = watch_directory(&ws, "watched", "start", Some(&id), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = watch_directory(&ws, "", "stop", Some("obs_missing"), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = watch_directory(&ws, "missing", "start", None, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        watch_directory(&ws, "", "stop", Some(&id), true).unwrap();
    }
}
