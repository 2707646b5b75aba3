//! Waiting for a job state by polling [`JobTracker::job_state`].

use std::{fmt, thread, time::Duration, time::Instant};

use log::{debug, trace};

use crate::{JobState, JobTracker};

/// Passing this as timeout waits until the job reaches one of the requested states, however long that takes.
pub const INFINITE_TIME: Duration = Duration::MAX;

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);

pub struct Deadline(Option<Instant>);

impl Deadline {
    /// Create a new deadline that times out after the provided duration. Durations too large to represent never
    /// time out.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Sleeps for `duration` or until the deadline, whichever comes first. Returns Err without sleeping once the
    /// deadline has passed.
    pub fn sleep(&self, duration: Duration) -> Result<(), ()> {
        let duration = match self.0 {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => duration.min(remaining),
                _ => return Err(()),
            },
            None => duration,
        };
        thread::sleep(duration);
        Ok(())
    }
}

#[derive(Debug)]
pub enum WaitError {
    NoStates,
    Timeout {
        job_id: String,
        timeout: Duration,
        last_state: JobState,
    },
    Poll(crate::Error),
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::NoStates => f.write_str("no job states to wait for"),
            WaitError::Timeout {
                job_id,
                timeout,
                last_state,
            } => write!(
                f,
                "timeout after {timeout:?} while waiting for job {job_id:?}, last observed state is {last_state}"
            ),
            WaitError::Poll(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for WaitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WaitError::Poll(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Poller {
    pub interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLLING_INTERVAL,
        }
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Queries the job state every interval until it is one of `states`. The last query happens once `timeout` has
    /// passed. Fails if the state is not reached by then or when querying the state fails.
    pub fn wait_for_state<T: JobTracker + ?Sized>(
        &self,
        tracker: &T,
        job_id: &str,
        timeout: Duration,
        states: &[JobState],
    ) -> Result<(), WaitError> {
        if states.is_empty() {
            return Err(WaitError::NoStates);
        }

        debug!("waiting up to {timeout:?} for job {job_id:?} to reach one of {states:?}");

        let deadline = Deadline::after(timeout);
        let mut previous = None;
        loop {
            let (state, sub_state) = tracker.job_state(job_id).map_err(WaitError::Poll)?;
            if previous != Some(state) {
                trace!("job {job_id:?} is {state} {sub_state}");
                previous = Some(state);
            }

            if states.contains(&state) {
                return Ok(());
            }

            deadline
                .sleep(self.interval)
                .map_err(|()| WaitError::Timeout {
                    job_id: job_id.to_string(),
                    timeout,
                    last_state: state,
                })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{JobInfo, JobTemplate, Result};

    /// Reports the states in order, repeating the last one. Once `switch` has passed, reports its state instead.
    struct ScriptedTracker {
        states: Mutex<Vec<JobState>>,
        switch: Option<(Instant, JobState)>,
    }

    impl ScriptedTracker {
        fn new(mut states: Vec<JobState>) -> Self {
            states.reverse();
            Self {
                states: Mutex::new(states),
                switch: None,
            }
        }

        fn switching(state: JobState, after: Duration, to: JobState) -> Self {
            Self {
                switch: Some((Instant::now() + after, to)),
                ..Self::new(vec![state])
            }
        }
    }

    impl JobTracker for ScriptedTracker {
        fn list_job_categories(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn list_jobs(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn add_job(&self, _: &JobTemplate) -> Result<String> {
            Err("unsupported".into())
        }

        fn add_array_job(&self, _: &JobTemplate, _: u32, _: u32, _: u32, _: u32) -> Result<String> {
            Err("unsupported".into())
        }

        fn list_array_jobs(&self, _: &str) -> Result<Vec<String>> {
            Err("unsupported".into())
        }

        fn job_state(&self, _: &str) -> Result<(JobState, String)> {
            if let Some((at, state)) = self.switch {
                if Instant::now() >= at {
                    return Ok((state, String::new()));
                }
            }
            let mut states = self.states.lock().unwrap();
            let state = if states.len() > 1 {
                states.pop().unwrap()
            } else {
                *states.last().ok_or("no state")?
            };
            Ok((state, String::new()))
        }

        fn job_info(&self, _: &str) -> Result<JobInfo> {
            Err("unsupported".into())
        }

        fn job_control(&self, _: &str, _: &str) -> Result<()> {
            Err("unsupported".into())
        }

        fn wait(&self, id: &str, timeout: Duration, states: &[JobState]) -> Result<()> {
            Ok(Poller::new(Duration::from_millis(5)).wait_for_state(self, id, timeout, states)?)
        }

        fn delete_job(&self, _: &str) -> Result<()> {
            Err("unsupported".into())
        }
    }

    #[test]
    fn returns_once_a_target_state_is_reached() {
        let tracker = ScriptedTracker::new(vec![
            JobState::Queued,
            JobState::Queued,
            JobState::Running,
        ]);
        tracker
            .wait("job", Duration::from_secs(5), &[JobState::Running, JobState::Done])
            .unwrap();
    }

    #[test]
    fn times_out_when_state_is_never_reached() {
        let tracker = ScriptedTracker::new(vec![JobState::Queued]);
        let start = Instant::now();
        let error = Poller::new(Duration::from_millis(30))
            .wait_for_state(&tracker, "job", Duration::from_millis(100), &[JobState::Running])
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "gave up after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2));
        assert!(matches!(
            error,
            WaitError::Timeout {
                last_state: JobState::Queued,
                ..
            }
        ));
    }

    #[test]
    fn state_reached_within_an_interval_is_observed() {
        let tracker = ScriptedTracker::switching(
            JobState::Queued,
            Duration::from_millis(300),
            JobState::Running,
        );
        let start = Instant::now();
        Poller::default()
            .wait_for_state(&tracker, "job", Duration::from_secs(1), &[JobState::Running])
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn state_reached_at_the_deadline_is_observed() {
        let tracker = ScriptedTracker::switching(
            JobState::Queued,
            Duration::from_millis(220),
            JobState::Running,
        );
        // Polls at 0 and 200 ms see Queued, the final poll at the 250 ms deadline sees Running.
        Poller::new(Duration::from_millis(200))
            .wait_for_state(&tracker, "job", Duration::from_millis(250), &[JobState::Running])
            .unwrap();
    }

    #[test]
    fn poll_errors_propagate() {
        let tracker = ScriptedTracker::new(Vec::new());
        let error = Poller::default()
            .wait_for_state(&tracker, "job", INFINITE_TIME, &[JobState::Done])
            .unwrap_err();
        assert_eq!(error.to_string(), "no state");
    }

    #[test]
    fn rejects_empty_target_states() {
        let tracker = ScriptedTracker::new(vec![JobState::Done]);
        assert!(matches!(
            Poller::default().wait_for_state(&tracker, "job", INFINITE_TIME, &[]),
            Err(WaitError::NoStates)
        ));
    }

    #[test]
    fn infinite_deadline_never_expires() {
        assert!(Deadline::after(INFINITE_TIME).sleep(Duration::ZERO).is_ok());
        assert!(Deadline::after(Duration::ZERO)
            .sleep(Duration::from_millis(1))
            .is_err());
    }

    #[test]
    fn sleep_stops_at_the_deadline() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let start = Instant::now();
        assert!(deadline.sleep(Duration::from_secs(10)).is_ok());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(deadline.sleep(Duration::from_millis(1)).is_err());
    }
}
