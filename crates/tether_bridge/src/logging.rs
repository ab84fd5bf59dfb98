//! # Tiered Logging
//!
//! Bridge log lines belong to one of five tiers, each switchable at runtime
//! by the peer (`setLogOptions`). Enabled lines go to `tracing` under the
//! target `tether::<tier>`, or to the peer as `log` commands when routing is
//! on.
//!
//! Performance traces (`measure`) are switched separately by category
//! (`setMeasureOptions`).

use std::fmt;
use std::str::FromStr;

/// Log tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogTier {
    /// General notices.
    Info,
    /// Session lifecycle.
    Session,
    /// Periodic statistics.
    Diagnostics,
    /// Registry misses and dropped frames.
    Debug,
    /// Every command.
    Verbose,
}

impl LogTier {
    /// All tiers, in order.
    pub const ALL: [Self; 5] = [
        Self::Info,
        Self::Session,
        Self::Diagnostics,
        Self::Debug,
        Self::Verbose,
    ];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Session => "session",
            Self::Diagnostics => "diagnostics",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
        }
    }

    /// Tracing target for this tier.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::Info => "tether::info",
            Self::Session => "tether::session",
            Self::Diagnostics => "tether::diagnostics",
            Self::Debug => "tether::debug",
            Self::Verbose => "tether::verbose",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LogTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.name() == s.trim())
            .ok_or_else(|| s.to_owned())
    }
}

/// Option name that routes log lines to the peer instead of `tracing`.
pub const ROUTE_TO_PEER: &str = "routeToCroquet";

/// Which tiers are shown, and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogOptions {
    enabled: [bool; 5],
    route_to_peer: bool,
}

impl LogOptions {
    /// Nothing enabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            enabled: [false; 5],
            route_to_peer: false,
        }
    }

    /// Parses a comma-separated option list, as carried by `setLogOptions`.
    /// Unknown names are ignored.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::from_names(list.split(','))
    }

    /// Builds options from tier names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::none();
        for name in names {
            let name = name.as_ref().trim();
            if name == ROUTE_TO_PEER {
                options.route_to_peer = true;
            } else if let Ok(tier) = name.parse::<LogTier>() {
                options.set(tier, true);
            }
        }
        options
    }

    /// True if `tier` is shown.
    #[inline]
    #[must_use]
    pub const fn enabled(&self, tier: LogTier) -> bool {
        self.enabled[tier.index()]
    }

    /// Shows or hides a tier.
    pub fn set(&mut self, tier: LogTier, on: bool) {
        self.enabled[tier.index()] = on;
    }

    /// True if lines go to the peer.
    #[must_use]
    pub const fn route_to_peer(&self) -> bool {
        self.route_to_peer
    }

    /// Re-encodes as a `setLogOptions` argument.
    #[must_use]
    pub fn to_list(&self) -> String {
        let mut names: Vec<&str> = LogTier::ALL
            .into_iter()
            .filter(|tier| self.enabled(*tier))
            .map(LogTier::name)
            .collect();
        if self.route_to_peer {
            names.push(ROUTE_TO_PEER);
        }
        names.join(",")
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self::from_names(["info", "session"])
    }
}

/// Emits one line to `tracing` under the tier's target.
pub fn emit(tier: LogTier, message: &str) {
    match tier {
        LogTier::Info => tracing::info!(target: "tether::info", "{message}"),
        LogTier::Session => tracing::info!(target: "tether::session", "{message}"),
        LogTier::Diagnostics => tracing::info!(target: "tether::diagnostics", "{message}"),
        LogTier::Debug => tracing::debug!(target: "tether::debug", "{message}"),
        LogTier::Verbose => tracing::trace!(target: "tether::verbose", "{message}"),
    }
}

/// Tier filter plus the peer-routing outbox.
#[derive(Debug, Clone, Default)]
pub struct TierLogger {
    options: LogOptions,
    routed: Vec<String>,
}

impl TierLogger {
    /// Creates a logger with the given options.
    #[must_use]
    pub const fn new(options: LogOptions) -> Self {
        Self {
            options,
            routed: Vec::new(),
        }
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> &LogOptions {
        &self.options
    }

    /// Replaces the options.
    pub fn set_options(&mut self, options: LogOptions) {
        self.options = options;
    }

    /// True if `tier` is shown.
    #[inline]
    #[must_use]
    pub const fn enabled(&self, tier: LogTier) -> bool {
        self.options.enabled(tier)
    }

    /// Logs a line if its tier is on. The message is only built when needed.
    pub fn log<F: FnOnce() -> String>(&mut self, tier: LogTier, message: F) {
        if !self.options.enabled(tier) {
            return;
        }
        let line = message();
        if self.options.route_to_peer {
            self.routed.push(line);
        } else {
            emit(tier, &line);
        }
    }

    /// Takes the lines waiting to be sent to the peer.
    pub fn take_routed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.routed)
    }
}

/// Logs through a [`TierLogger`], building the message lazily.
///
/// ```ignore
/// tier_log!(self.logger, Debug, "attempt to update absent object {handle}");
/// ```
macro_rules! tier_log {
    ($logger:expr, $tier:ident, $($arg:tt)+) => {
        $logger.log($crate::logging::LogTier::$tier, || format!($($arg)+))
    };
}
pub(crate) use tier_log;

/// Measurement category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeasureCategory {
    /// Whole tick duration.
    Update,
    /// Text bundle end-to-end time.
    Bundle,
    /// Geometry batch end-to-end time.
    Geom,
}

impl MeasureCategory {
    /// All categories.
    pub const ALL: [Self; 3] = [Self::Update, Self::Bundle, Self::Geom];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Bundle => "bundle",
            Self::Geom => "geom",
        }
    }
}

/// Which measurement categories are reported to the peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeasureOptions {
    /// Report tick durations.
    pub update: bool,
    /// Report bundle timings.
    pub bundle: bool,
    /// Report geometry batch timings.
    pub geom: bool,
}

impl MeasureOptions {
    /// Parses a comma-separated list, as carried by `setMeasureOptions`.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::from_names(list.split(','))
    }

    /// Builds options from category names. Unknown names are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        for name in names {
            match name.as_ref().trim() {
                "update" => options.update = true,
                "bundle" => options.bundle = true,
                "geom" => options.geom = true,
                _ => {}
            }
        }
        options
    }

    /// True if `category` is reported.
    #[must_use]
    pub const fn enabled(&self, category: MeasureCategory) -> bool {
        match category {
            MeasureCategory::Update => self.update,
            MeasureCategory::Bundle => self.bundle,
            MeasureCategory::Geom => self.geom,
        }
    }

    /// Re-encodes as a `setMeasureOptions` argument.
    #[must_use]
    pub fn to_list(&self) -> String {
        MeasureCategory::ALL
            .into_iter()
            .filter(|c| self.enabled(*c))
            .map(MeasureCategory::name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One performance trace, sent to the peer as a `measure` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measurement {
    /// Category.
    pub category: MeasureCategory,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub start_ms: i64,
    /// Duration in milliseconds.
    pub duration_ms: i64,
    /// Free-form note.
    pub annotation: Option<String>,
}

impl Measurement {
    /// `measure` arguments: category, start, duration, and the annotation
    /// if any.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.category.name().to_owned(),
            self.start_ms.to_string(),
            self.duration_ms.to_string(),
        ];
        if let Some(note) = &self.annotation {
            args.push(note.clone());
        }
        args
    }
}
