//! Timer tasks armed by match rooms.
//!
//! Each armed timer is a tokio task whose handle lives next to the room it
//! belongs to. Firing re-enters the room through the registry and the room
//! decides, from the generation carried by the token, whether the firing is
//! still current.

use std::collections::HashMap;

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::trace;

use crate::{
    services::match_service,
    state::{
        SharedState,
        participant::MatchId,
        room::{TimerKind, TimerSchedule, TimerToken},
    },
};

/// Timer tasks of one room, keyed by kind. At most one task per kind is alive.
#[derive(Debug, Default)]
pub struct RoomTimers {
    tasks: HashMap<TimerKind, JoinHandle<()>>,
}

impl RoomTimers {
    /// Spawn the task for `token`, aborting the previous task of the same kind.
    pub fn arm(
        &mut self,
        state: SharedState,
        match_id: MatchId,
        token: TimerToken,
        schedule: TimerSchedule,
    ) {
        trace!(%match_id, kind = ?token.kind, generation = token.generation, "arming timer");
        let task = tokio::spawn(run_timer(state, match_id, token, schedule));
        if let Some(previous) = self.tasks.insert(token.kind, task) {
            previous.abort();
        }
    }

    /// Abort the task of `kind`, if any.
    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(task) = self.tasks.remove(&kind) {
            task.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }

    /// Number of timer tasks that have not finished yet.
    pub fn live(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl Drop for RoomTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_timer(state: SharedState, match_id: MatchId, token: TimerToken, schedule: TimerSchedule) {
    match schedule {
        TimerSchedule::Once(delay) => {
            time::sleep(delay).await;
            match_service::fire_timer(&state, &match_id, token).await;
        }
        TimerSchedule::Every(period) => {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if !match_service::fire_timer(&state, &match_id, token).await {
                    break;
                }
            }
        }
    }
}
