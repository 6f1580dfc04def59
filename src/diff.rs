//! New-item classification over an unordered, externally controlled listing.
//!
//! The ever-delivered set is the dedup authority. The recency window stored in
//! [`Cursor`] only tells a first poll apart from a later one and always mirrors
//! the current top of the source.

use std::collections::HashSet;

/// Entries kept in the recency window.
pub const WINDOW_SIZE: usize = 10;
/// This many known identifiers in a row ends the scan.
pub const KNOWN_RUN_THRESHOLD: usize = 5;
/// Upper bound on deliveries per source per cycle.
pub const MAX_BURST: usize = 50;
/// Newest candidates delivered when nothing in the listing is known any more.
pub const CONTINUITY_FALLBACK: usize = 3;

/// Recency window for one source, most-recent-first, at most [`WINDOW_SIZE`] entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    window: Vec<String>,
}

impl Cursor {
    pub fn new(mut window: Vec<String>) -> Self {
        window.truncate(WINDOW_SIZE);
        Self { window }
    }

    pub fn from_candidates(candidates: &[String]) -> Self {
        Self::new(candidates.iter().take(WINDOW_SIZE).cloned().collect())
    }

    pub fn is_empty(&self) -> bool { self.window.is_empty() }

    pub fn window(&self) -> &[String] { &self.window }
}

/// Why the scan over the candidate list ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScanStop {
    KnownRun,
    BurstCap,
    Exhausted,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Source returned nothing; cursor left as it was.
    Empty,
    /// No cursor yet: only the newest item goes out.
    ColdStart,
    Incremental { stop: ScanStop },
    /// Listing shares nothing with what was delivered before.
    ContinuityLoss,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Empty => "empty",
            Verdict::ColdStart => "cold_start",
            Verdict::Incremental { stop: ScanStop::KnownRun } => "incremental/known_run",
            Verdict::Incremental { stop: ScanStop::BurstCap } => "incremental/burst_cap",
            Verdict::Incremental { stop: ScanStop::Exhausted } => "incremental/exhausted",
            Verdict::ContinuityLoss => "continuity_loss",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    /// Newest-first, in source order.
    pub to_deliver: Vec<String>,
    pub cursor: Cursor,
    pub verdict: Verdict,
}

/// Decide which candidates to deliver this cycle.
///
/// `known` holds the candidates already in the ever-delivered set; anything
/// else in it is ignored.
pub fn classify(candidates: &[String], cursor: &Cursor, known: &HashSet<String>) -> Classification {
    if candidates.is_empty() {
        return Classification { to_deliver: Vec::new(), cursor: cursor.clone(), verdict: Verdict::Empty };
    }

    let next = Cursor::from_candidates(candidates);

    if cursor.is_empty() {
        return Classification { to_deliver: vec![candidates[0].clone()], cursor: next, verdict: Verdict::ColdStart };
    }

    if !candidates.iter().any(|c| known.contains(c)) {
        let to_deliver = candidates.iter().take(CONTINUITY_FALLBACK).cloned().collect();
        return Classification { to_deliver, cursor: next, verdict: Verdict::ContinuityLoss };
    }

    let mut to_deliver: Vec<String> = Vec::new();
    let mut consecutive_known = 0usize;
    // length of `to_deliver` when the most recent known identifier was scanned
    let mut before_last_known: Option<usize> = None;
    let mut stop = ScanStop::Exhausted;

    for candidate in candidates {
        if known.contains(candidate) {
            consecutive_known += 1;
            before_last_known = Some(to_deliver.len());
            if consecutive_known >= KNOWN_RUN_THRESHOLD {
                stop = ScanStop::KnownRun;
                break;
            }
        } else {
            consecutive_known = 0;
            to_deliver.push(candidate.clone());
            if to_deliver.len() >= MAX_BURST {
                stop = ScanStop::BurstCap;
                break;
            }
        }
    }

    // Unseen entries listed below every known one are backlog older than our history.
    if stop == ScanStop::Exhausted {
        if let Some(n) = before_last_known {
            to_deliver.truncate(n);
        }
    }

    Classification { to_deliver, cursor: next, verdict: Verdict::Incremental { stop } }
}
