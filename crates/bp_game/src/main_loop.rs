//! Fixed-cadence frame driver.
//!
//! `poll` is called as often as the host likes. When less than the target
//! interval has passed it does nothing; otherwise it runs the four frame
//! phases once, in order. A quit from the input phase skips that frame's
//! render and present and stops the loop for good.

use std::time::Duration;

use bp_core::time::{FramePacer, FrameTick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not due yet.
    Idle,
    /// One full frame ran.
    Ran,
    /// Input asked to quit during this poll.
    Quit,
    /// The loop had already stopped.
    Terminated,
}

/// The work done by one frame, in call order.
pub trait FramePhases {
    fn step_physics(&mut self, tick: &FrameTick);
    fn process_input(&mut self, tick: &FrameTick) -> LoopControl;
    fn render(&mut self, tick: &FrameTick, pacer: &FramePacer);
    fn present(&mut self, tick: &FrameTick);
}

pub struct MainLoop {
    pacer: FramePacer,
    running: bool,
}

impl MainLoop {
    pub fn new(target_interval: Duration, start: Duration) -> Self {
        Self {
            pacer: FramePacer::new(target_interval, start),
            running: true,
        }
    }

    pub fn poll(&mut self, now: Duration, phases: &mut dyn FramePhases) -> PollOutcome {
        if !self.running {
            return PollOutcome::Terminated;
        }
        let Some(tick) = self.pacer.poll(now) else {
            return PollOutcome::Idle;
        };

        phases.step_physics(&tick);
        if phases.process_input(&tick) == LoopControl::Quit {
            self.running = false;
            log::info!("Main loop stopped after {} frames", tick.frame_index);
            return PollOutcome::Quit;
        }
        phases.render(&tick, &self.pacer);
        phases.present(&tick);
        PollOutcome::Ran
    }

    /// Busy-waits on `clock` until the phases ask to quit. Returns the number
    /// of frames that ran. The windowed app drives `poll` from winit instead.
    #[cfg(test)]
    pub fn run_until_quit(
        &mut self,
        clock: &bp_core::time::MonotonicClock,
        phases: &mut dyn FramePhases,
    ) -> u64 {
        while self.running {
            self.poll(clock.now(), phases);
        }
        self.pacer.frame_count
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.running && self.pacer.is_due(now)
    }

    pub fn next_deadline(&self) -> Duration {
        self.pacer.next_deadline()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
