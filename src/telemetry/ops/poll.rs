use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Poll;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Cycle, Source, FetchCandidates, Classify, Deliver, SaveCursor }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Cycle => "cycle",
        Phase::Source => "source",
        Phase::FetchCandidates => "fetch_candidates",
        Phase::Classify => "classify",
        Phase::Deliver => "deliver",
        Phase::SaveCursor => "save_cursor",
    }}
    fn span(&self) -> Span { match self {
        Phase::Cycle => info_span!("cycle"),
        Phase::Source => info_span!("source"),
        Phase::FetchCandidates => info_span!("fetch_candidates"),
        Phase::Classify => info_span!("classify"),
        Phase::Deliver => info_span!("deliver"),
        Phase::SaveCursor => info_span!("save_cursor"),
    }}
}

impl OpMarker for Poll {
    const NAME: &'static str = "poll";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("poll") }
}
