use crate::error::ConfigError;

/// Parse a ratio written as a number, a fraction or a sum of those:
/// `"2"`, `"1.706"`, `"4/3"`, `"1+1/3"`.
///
/// Overgridding factors are conventionally quoted like this (e.g. `1+1/3`
/// for cardiac data), so accept them verbatim from configuration files and
/// the command line.
pub fn parse_ratio(s: &str) -> Result<f64, ConfigError> {
    let invalid = || ConfigError::InvalidRatio(s.to_string());
    let term = |t: &str| -> Result<f64, ConfigError> {
        let v = t.split('/').map(str::trim).collect::<Vec<_>>();
        match v.as_slice() {
            [x]    => x.parse().map_err(|_| invalid()),
            [n, d] => {
                let n: f64 = n.parse().map_err(|_| invalid())?;
                let d: f64 = d.parse().map_err(|_| invalid())?;
                if d == 0.0 { Err(invalid()) } else { Ok(n / d) }
            },
            _ => Err(invalid()),
        }
    };
    if s.trim().is_empty() { return Err(invalid()) }
    s.split('+').map(term).sum()
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

/// Install a `fmt` subscriber for `tracing` events, filtered by `RUST_LOG`
/// (default: `info`). For use by executables only: the library never installs
/// a subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Fails only if a global subscriber is already set, which is harmless
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}


pub mod timing {

    use super::group_digits;
    use std::time::Instant;
    use tracing::info;

    /// Report the wall-clock time taken by successive stages of a program.
    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Log the start of a stage and restart the timer.
        pub fn start(&mut self, message: &str) {
            info!("{message} ...");
            self.start_timer();
        }

        /// Log time elapsed since last start or done
        pub fn done(&mut self) {
            info!("   done in {} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        /// Log message followed by time elapsed since last start or done
        pub fn done_with_message(&mut self, message: &str) {
            info!("{message}: {} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}
