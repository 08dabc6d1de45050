use crate::models::EmploymentEpisode;
use chrono::NaiveDate;

/// Canonical employment state derived from the raw status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmploymentState {
    Employed,
    Contracting,
    Studying,
    Idle,
    Other,
}

impl EmploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentState::Employed => "EMPLOYED",
            EmploymentState::Contracting => "CONTRACTING",
            EmploymentState::Studying => "STUDYING",
            EmploymentState::Idle => "IDLE",
            EmploymentState::Other => "OTHER",
        }
    }
}

/// Maps a raw status label to its canonical state. Unknown labels become
/// `Other` rather than failing the row.
pub fn canonical_state(raw: &str) -> EmploymentState {
    match raw.trim().to_ascii_lowercase().as_str() {
        "employed" | "full_time" | "full-time" | "permanent" => EmploymentState::Employed,
        "contract" | "contractor" | "freelance" | "self_employed" => EmploymentState::Contracting,
        "student" | "studying" | "enrolled" | "intern" | "internship" => EmploymentState::Studying,
        "unemployed" | "idle" | "between_jobs" | "sabbatical" => EmploymentState::Idle,
        _ => EmploymentState::Other,
    }
}

/// End dates at or past this mark mean "no end recorded" in the source.
pub fn is_open_end(date: NaiveDate) -> bool {
    date >= NaiveDate::from_ymd_opt(9999, 1, 1).unwrap()
}

#[derive(Debug, Clone)]
pub struct DeriveOptions {
    /// Days between episodes beyond which a synthetic idle interval fills
    /// the gap.
    pub idle_gap_days: i64,
    /// Emit one idle interval when a row has no episodes at all.
    pub infer_initial: bool,
    /// Anchor for inferred initial intervals.
    pub default_start: NaiveDate,
}

/// One derived state interval. An interval with no end is open-ended;
/// `is_current` marks the single currently-active one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInterval {
    pub state: EmploymentState,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub is_current: bool,
}

/// Turns an episode list into an ordered interval sequence.
///
/// Deterministic and order-stable: episodes are stably sorted by start
/// date, so identical input (in any order) yields identical output. Gaps
/// beyond the threshold are modeled as explicit idle intervals, never
/// silently dropped. At most one interval comes out current: the last
/// open-ended one.
pub fn derive_intervals(
    episodes: &[EmploymentEpisode],
    opts: &DeriveOptions,
) -> Vec<StateInterval> {
    let mut dated: Vec<&EmploymentEpisode> =
        episodes.iter().filter(|e| e.start_date.is_some()).collect();
    if dated.is_empty() {
        if opts.infer_initial {
            return vec![StateInterval {
                state: EmploymentState::Idle,
                start: opts.default_start,
                end: None,
                is_current: true,
            }];
        }
        return Vec::new();
    }
    dated.sort_by_key(|e| e.start_date);

    let mut intervals = Vec::with_capacity(dated.len());
    let mut prev_end: Option<NaiveDate> = None;
    for episode in dated {
        let start = episode.start_date.unwrap();
        let end = episode.end_date.filter(|d| !is_open_end(*d));

        if let Some(prev) = prev_end {
            let gap = (start - prev).num_days();
            if gap > opts.idle_gap_days {
                intervals.push(StateInterval {
                    state: EmploymentState::Idle,
                    start: prev,
                    end: Some(start),
                    is_current: false,
                });
            }
        }

        let state = episode
            .status
            .as_deref()
            .map(canonical_state)
            .unwrap_or(EmploymentState::Employed);
        intervals.push(StateInterval {
            state,
            start,
            end,
            is_current: false,
        });
        prev_end = end;
    }

    // Only the last open-ended interval is the active one.
    if let Some(last_open) = intervals.iter().rposition(|i| i.end.is_none()) {
        intervals[last_open].is_current = true;
    }
    intervals
}
