//! The scheduler proper: session↔schedule associations, periodic `tick`,
//! and the once-per-day guards spec.md §4.G and §8 (invariant 6) require.

use crate::schedule::Schedule;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use xlink_core::{Clock, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    SessionStart,
    SessionEnd,
    WarningReset,
    ResetDue,
}

pub trait SchedulerListener {
    fn on_schedule_event(&mut self, session_id: &SessionId, event: SchedulerEvent);
}

struct SessionState {
    schedule_name: String,
    active: bool,
    last_reset_date: Option<NaiveDate>,
    last_warned_date: Option<NaiveDate>,
}

/// Owns the set of registered [`Schedule`]s and the sessions associated
/// with them; `tick()` re-evaluates every associated session's expected
/// active/reset state and emits the transitions that changed since the
/// last tick.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    schedules: HashMap<String, Schedule>,
    sessions: HashMap<SessionId, SessionState>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Scheduler {
            clock,
            schedules: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn register_schedule(&mut self, schedule: Schedule) {
        self.schedules.insert(schedule.name.clone(), schedule);
    }

    /// Associates `session_id` with a previously registered schedule.
    /// Starts tracked as inactive so the first `tick()` reports
    /// `SessionStart` if the window is already open.
    pub fn associate(&mut self, session_id: SessionId, schedule_name: impl Into<String>) {
        self.sessions.insert(
            session_id,
            SessionState {
                schedule_name: schedule_name.into(),
                active: false,
                last_reset_date: None,
                last_warned_date: None,
            },
        );
    }

    /// Re-evaluates every associated session against its schedule at the
    /// current clock time, invoking `listener` for each event that fires.
    /// Should be called at least once per second per spec.md §4.G.
    pub fn tick(&mut self, listener: &mut dyn SchedulerListener) {
        let now = self.clock.now_utc();
        for (session_id, state) in &mut self.sessions {
            let Some(schedule) = self.schedules.get(&state.schedule_name) else {
                continue;
            };
            let local = now.with_timezone(&schedule.timezone).naive_local();

            let should_be_active = schedule.is_active_at(local);
            if should_be_active && !state.active {
                state.active = true;
                listener.on_schedule_event(session_id, SchedulerEvent::SessionStart);
            } else if !should_be_active && state.active {
                state.active = false;
                listener.on_schedule_event(session_id, SchedulerEvent::SessionEnd);
            }

            if schedule.warning_due(local, state.last_warned_date) == Some(true) {
                state.last_warned_date = Some(local.date());
                listener.on_schedule_event(session_id, SchedulerEvent::WarningReset);
            }

            if schedule.reset_due(local, state.last_reset_date) == Some(true) {
                state.last_reset_date = Some(local.date());
                listener.on_schedule_event(session_id, SchedulerEvent::ResetDue);
            }
        }
    }
}
