//! Profiling support via Tracy.
//!
//! Instrumentation is compiled in with the `profiling` Cargo feature:
//!
//! ```bash
//! cargo run --features profiling
//! ```
//!
//! The renderer marks a span around compilation, planning, recording and
//! presentation, and a frame boundary after every rendered frame. When the
//! feature is disabled every macro expands to nothing.
//!
//! ```ignore
//! use redlilium_framegraph::{frame_mark, profile_scope};
//!
//! fn update() {
//!     profile_scope!("update");
//!     // ...
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, frame_mark as tracy_frame_mark, plot as tracy_plot, span};

/// Start the Tracy client. Harmless to call more than once.
#[cfg(feature = "profiling")]
pub fn start() {
    tracy_client::Client::start();
}

/// Start the Tracy client (no-op when profiling disabled).
#[cfg(not(feature = "profiling"))]
pub fn start() {}

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Create a profiling span that ends with the current scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Plot a value over time in Tracy.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plot a value (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        let _ = $value;
    };
}
