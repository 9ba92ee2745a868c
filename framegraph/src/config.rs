//! Renderer configuration.

use crate::error::GraphicsError;
use crate::swapchain::PresentMode;

/// Upper bound on frame slots.
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Environment variable overriding [`RendererConfig::frames_in_flight`].
pub const FRAMES_IN_FLIGHT_ENV: &str = "REDLILIUM_FRAMES_IN_FLIGHT";

/// Environment variable overriding [`RendererConfig::validation`].
pub const VALIDATION_ENV: &str = "REDLILIUM_VALIDATION";

/// Settings fixed when a [`Renderer`](crate::Renderer) is built.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::{PresentMode, RendererConfig};
///
/// let config = RendererConfig::new()
///     .with_frames_in_flight(3)
///     .with_present_mode(PresentMode::Fifo)
///     .with_application_name("Particles");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    /// Number of frame slots, `1..=MAX_FRAMES_IN_FLIGHT`.
    pub frames_in_flight: usize,
    /// Enable the backend's validation layers.
    pub validation: bool,
    /// Preferred present mode; the backend falls back to FIFO.
    pub present_mode: PresentMode,
    /// Reported to the driver.
    pub application_name: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            present_mode: PresentMode::default(),
            application_name: "RedLilium".to_string(),
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`. Malformed values are
    /// logged and ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(FRAMES_IN_FLIGHT_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(count) if (1..=MAX_FRAMES_IN_FLIGHT).contains(&count) => {
                    self.frames_in_flight = count;
                }
                _ => log::warn!(
                    "Ignoring {FRAMES_IN_FLIGHT_ENV}={raw:?}: expected 1..={MAX_FRAMES_IN_FLIGHT}"
                ),
            }
        }

        if let Some(raw) = lookup(VALIDATION_ENV) {
            match parse_flag(&raw) {
                Some(enabled) => self.validation = enabled,
                None => log::warn!("Ignoring {VALIDATION_ENV}={raw:?}: expected a boolean"),
            }
        }

        self
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_present_mode(mut self, present_mode: PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(GraphicsError::InvalidParameter(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

static_assertions::assert_impl_all!(RendererConfig: Send, Sync);
