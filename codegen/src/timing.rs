//! Pass timing.
//!
//! This module provides facilities for timing the execution of individual
//! compilation passes. Every pass entry point acquires a token; the elapsed
//! time is accumulated in thread-local storage when the token is dropped,
//! and can be printed with [`take_current`].

use core::fmt;

// Each pass that can be timed is predefined with the `define_passes!`
// macro. Each pass has a snake_case name and a plain text description used
// when printing out the timing report.
macro_rules! define_passes {
    ($($pass:ident: $desc:expr,)+) => {
        /// A single compilation pass we can time.
        #[allow(missing_docs, non_camel_case_types)]
        #[derive(Clone, Copy, PartialEq, Eq, Debug)]
        pub enum Pass {
            $($pass,)+
            /// Number of passes; not a real pass.
            None,
        }

        const NUM_PASSES: usize = Pass::None as usize;

        const DESCRIPTIONS: [&str; NUM_PASSES] = [$($desc,)+];

        impl Pass {
            fn idx(self) -> usize {
                self as usize
            }

            /// Description of the pass.
            pub fn description(self) -> &'static str {
                match self {
                    Pass::None => "<no pass>",
                    _ => DESCRIPTIONS[self.idx()],
                }
            }
        }

        $(
            /// Start timing this pass. The pass ends when the token is
            /// dropped.
            #[must_use]
            pub fn $pass() -> TimingToken {
                start_pass(Pass::$pass)
            }
        )+
    }
}

define_passes! {
    flowgraph: "Control flow graph",
    domtree: "Dominator tree",
    ssa_uses: "SSA use sets",
    copy_prop: "Copy propagation",
    cse: "Common subexpression elimination",
    dce: "Dead code elimination",
    postra_sched: "Post-RA scheduling",
    verify_shader: "Shader verifier",
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(feature = "timing")]
pub use details::{take_current, PassTimes, TimingToken};

#[cfg(feature = "timing")]
fn start_pass(pass: Pass) -> TimingToken {
    details::start_pass(pass)
}

#[cfg(not(feature = "timing"))]
pub use stubs::{take_current, PassTimes, TimingToken};

#[cfg(not(feature = "timing"))]
fn start_pass(_pass: Pass) -> TimingToken {
    TimingToken
}

#[cfg(not(feature = "timing"))]
mod stubs {
    use core::fmt;

    /// A timing token from a disabled timing build; does nothing.
    pub struct TimingToken;

    /// Accumulated timing; empty in disabled builds.
    #[derive(Default)]
    pub struct PassTimes;

    impl fmt::Display for PassTimes {
        fn fmt(&self, _f: &mut fmt::Formatter) -> fmt::Result {
            Ok(())
        }
    }

    /// Take the current accumulated pass timings and reset them.
    pub fn take_current() -> PassTimes {
        PassTimes
    }
}

#[cfg(feature = "timing")]
mod details {
    use super::{Pass, DESCRIPTIONS, NUM_PASSES};
    use core::cell::{Cell, RefCell};
    use core::fmt;
    use std::time::{Duration, Instant};

    /// A timing token is responsible for timing the currently running pass.
    /// Timing starts when it is created and ends when it is dropped.
    pub struct TimingToken {
        start: Instant,
        pass: Pass,
        prev: Pass,
    }

    /// Accumulated timing for all passes.
    #[derive(Default)]
    pub struct PassTimes {
        total: [Duration; NUM_PASSES],
    }

    impl fmt::Display for PassTimes {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            writeln!(f, "========  ==================================")?;
            writeln!(f, "    Time  Pass")?;
            writeln!(f, "--------  ----------------------------------")?;
            for (time, desc) in self.total.iter().zip(DESCRIPTIONS) {
                if *time != Duration::default() {
                    writeln!(f, "{:8.3}  {}", time.as_secs_f64(), desc)?;
                }
            }
            writeln!(f, "========  ==================================")
        }
    }

    thread_local! {
        static CURRENT_PASS: Cell<Pass> = const { Cell::new(Pass::None) };
        static PASS_TIME: RefCell<PassTimes> = RefCell::new(Default::default());
    }

    pub(super) fn start_pass(pass: Pass) -> TimingToken {
        let prev = CURRENT_PASS.with(|p| p.replace(pass));
        log::debug!("timing: Starting {}, (during {})", pass, prev);
        TimingToken {
            start: Instant::now(),
            pass,
            prev,
        }
    }

    impl Drop for TimingToken {
        fn drop(&mut self) {
            let duration = self.start.elapsed();
            log::debug!("timing: Ending {}: {}ms", self.pass, duration.as_millis());
            CURRENT_PASS.with(|p| p.set(self.prev));
            PASS_TIME.with(|rc| {
                rc.borrow_mut().total[self.pass.idx()] += duration;
            });
        }
    }

    /// Take the current accumulated pass timings and reset them.
    pub fn take_current() -> PassTimes {
        PASS_TIME.with(|rc| core::mem::take(&mut *rc.borrow_mut()))
    }
}
