/// Per-run cache statistics
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Cache outcome of one node invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Signature matched and the stored output was used
    Hit,
    /// Executed and written back
    Miss,
    /// Caching off for this node or this run
    Disabled,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEvent {
    pub node: String,
    /// `None` when no key was computed (caching disabled)
    pub cache_key: Option<String>,
    pub outcome: CacheOutcome,
    /// Output came from the backend rather than from executing the node
    pub loaded: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    events: Vec<CacheEvent>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: CacheEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[CacheEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.count(CacheOutcome::Hit)
    }

    pub fn misses(&self) -> usize {
        self.count(CacheOutcome::Miss)
    }

    pub fn uncached(&self) -> usize {
        self.count(CacheOutcome::Disabled)
    }

    fn count(&self, outcome: CacheOutcome) -> usize {
        self.events.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Outcome of every event recorded for `node`, in order
    pub fn outcomes_for(&self, node: &str) -> Vec<CacheOutcome> {
        self.events
            .iter()
            .filter(|e| e.node == node)
            .map(|e| e.outcome)
            .collect()
    }

    /// One-line summary, e.g. `foo_out: HIT | bar_out: MISS (0.12s)`
    pub fn summary(&self) -> String {
        self.events
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Emit the summary and per-node events through tracing
    pub fn log(&self) {
        if self.events.is_empty() {
            return;
        }
        for event in &self.events {
            info!(
                node = %event.node,
                key = event.cache_key.as_deref().unwrap_or(""),
                status = event.outcome.as_str(),
                loaded = event.loaded,
                duration_ms = event.duration.as_millis() as u64,
                "cache event"
            );
        }
        info!(
            hits = self.hits(),
            misses = self.misses(),
            uncached = self.uncached(),
            "[cache] {}",
            self.summary()
        );
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            CacheOutcome::Hit => write!(f, "{}: HIT", self.node),
            CacheOutcome::Miss | CacheOutcome::Disabled => {
                let label = if self.outcome == CacheOutcome::Miss {
                    "MISS"
                } else {
                    "NO-CACHE"
                };
                write!(f, "{}: {}", self.node, label)?;
                if !self.duration.is_zero() {
                    write!(f, " ({:.2}s)", self.duration.as_secs_f64())?;
                }
                Ok(())
            }
        }
    }
}
