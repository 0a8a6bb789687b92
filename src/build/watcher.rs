//! Debounced rebuild-on-change.
//!
//! The loop is an explicit state machine ([`Debouncer`]):
//!
//! ```text
//! Idle --event--> Debouncing --deadline--> Building --done--> Idle
//!                  ^      |                    |
//!                  +event-+        event: mark pending; on done -> Debouncing
//! ```

use super::error::BuildError;
use super::orchestrator::BuildOrchestrator;
use crate::ide;
use anyhow::Result;
use colored::*;
use notify::{Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Debouncing { deadline: Instant },
    /// `pending` records events that arrived mid-build.
    Building { pending: bool },
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    state: WatchState,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// A change was observed at `now`.
    pub fn on_event(&mut self, now: Instant) {
        self.state = match self.state {
            WatchState::Idle | WatchState::Debouncing { .. } => WatchState::Debouncing {
                deadline: now + self.window,
            },
            WatchState::Building { .. } => WatchState::Building { pending: true },
        };
    }

    /// When the current debounce window expires, if one is running.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WatchState::Debouncing { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Returns true, and enters `Building`, once the window has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            WatchState::Debouncing { deadline } if now >= deadline => {
                self.state = WatchState::Building { pending: false };
                true
            }
            _ => false,
        }
    }

    /// The build started by [`poll`](Self::poll) finished at `now`.
    pub fn finish(&mut self, now: Instant) {
        self.state = match self.state {
            WatchState::Building { pending: true } => WatchState::Debouncing {
                deadline: now + self.window,
            },
            _ => WatchState::Idle,
        };
    }
}

/// Paths whose changes never trigger a rebuild, such as the pipeline's own
/// output. Without it a trigger that contains the build directory would
/// rebuild forever.
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    ignored: Vec<PathBuf>,
}

impl WatchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignores `path` and everything below it.
    pub fn ignore(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignored.push(path.into());
        self
    }

    /// Ignores the build directory and `compile_commands.json`, both as
    /// configured and through the canonical project root.
    pub fn for_project(orchestrator: &BuildOrchestrator) -> Self {
        let root = orchestrator.root();
        let mut roots = vec![root.to_path_buf()];
        if let Ok(canonical) = root.canonicalize()
            && canonical.as_path() != root
        {
            roots.push(canonical);
        }

        let build_dir = &orchestrator.config().project.build_dir;
        roots.into_iter().fold(Self::new(), |filter, root| {
            filter
                .ignore(root.join(build_dir))
                .ignore(root.join(ide::OUT_FILE))
        })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.iter().any(|ignored| path.starts_with(ignored))
    }

    /// True when `event` should start or extend a debounce window: anything
    /// but an access, touching at least one path outside the ignored set.
    /// Events without paths count as changes.
    pub fn is_change(&self, event: &Event) -> bool {
        if event.kind.is_access() {
            return false;
        }
        event.paths.is_empty() || event.paths.iter().any(|p| !self.is_ignored(p))
    }
}

/// Feeds watcher events into `debouncer` and calls `rebuild` once per burst,
/// never overlapping two rebuilds. A failed rebuild is printed and the loop
/// keeps watching. Returns when the event channel closes.
pub fn run_loop<F>(
    rx: &Receiver<notify::Result<Event>>,
    debouncer: &mut Debouncer,
    filter: &WatchFilter,
    mut rebuild: F,
) where
    F: FnMut() -> Result<()>,
{
    loop {
        let received = match debouncer.deadline() {
            Some(deadline) => {
                rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Ok(event)) if filter.is_change(&event) => debouncer.on_event(Instant::now()),
            Ok(Ok(_)) | Err(RecvTimeoutError::Timeout) => {}
            Ok(Err(e)) => println!("{} Watch error: {}", "!".yellow(), e),
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if debouncer.poll(Instant::now()) {
            if let Err(e) = rebuild() {
                println!("{} Error: {:#}", "x".red(), e);
            }
            // Whatever queued up during the build counts as new changes.
            for event in rx.try_iter().flatten() {
                if filter.is_change(&event) {
                    debouncer.on_event(Instant::now());
                }
            }
            debouncer.finish(Instant::now());
        }
    }
}

/// Watches the configured trigger path and runs `all` (clean, compile, run)
/// for `target` on change. Build output under the trigger is ignored.
///
/// If the platform watcher is unavailable this reports it and returns.
pub fn watch(orchestrator: &BuildOrchestrator, target: &str) -> Result<()> {
    let config = &orchestrator.config().watch;
    let trigger = orchestrator.root().join(&config.trigger);

    let (tx, rx) = channel();
    let mut watcher = match notify::recommended_watcher(tx) {
        Ok(w) => w,
        Err(e) => {
            println!("{} {}", "!".yellow(), BuildError::WatchUnavailable(e.to_string()));
            return Ok(());
        }
    };
    let mode = if trigger.is_dir() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    if let Err(e) = watcher.watch(&trigger, mode) {
        println!(
            "{} {}",
            "!".yellow(),
            BuildError::WatchUnavailable(format!("{}: {}", trigger.display(), e))
        );
        return Ok(());
    }

    println!("{} Watching {}...", "👀".cyan(), trigger.display());
    let filter = WatchFilter::for_project(orchestrator);
    let mut debouncer = Debouncer::new(Duration::from_millis(config.debounce_ms));
    run_loop(&rx, &mut debouncer, &filter, || rebuild(orchestrator, target));
    Ok(())
}

fn rebuild(orchestrator: &BuildOrchestrator, target: &str) -> Result<()> {
    println!("{} File changed. Rebuilding...", "🔄".yellow());
    orchestrator.all(target)?;
    Ok(())
}
