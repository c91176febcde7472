// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the delivery thread when neither the config nor the environment
/// sets one.
pub const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Resolves the delivery thread priority: CHOPDECK_THREAD_PRIORITY (0-99) wins over the
/// configured value. Read once when the stream is built, never in the callback.
pub fn callback_thread_priority(configured: u8) -> Option<ThreadPriorityValue> {
    let priority = std::env::var("CHOPDECK_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(configured.min(99));
    ThreadPriorityValue::try_from(priority).ok()
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Whether to attempt SCHED_FIFO for the delivery thread. Opt out with
/// CHOPDECK_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag("CHOPDECK_DISABLE_RT_AUDIO")
}

/// Raises the priority of the calling thread once. Later calls return immediately, so
/// this is safe to call at the top of every callback.
pub fn configure_audio_thread_priority(
    priority: Option<ThreadPriorityValue>,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    *priority_set = true;

    let Some(priority) = priority else {
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    let _ = set_current_thread_priority(tp);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for the delivery thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for the delivery thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;
}
