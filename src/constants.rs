//! Global constants for tidewatch
//!
//! Centralized location for application-wide constants

use std::time::Duration;

/// Application subsystem identifier, used for Unified Logging on macOS
/// and for daemon identification
pub const APP_SUBSYSTEM: &str = "io.tidewatch.daemon";

/// Binary name, used when searching for running daemon processes
pub const APP_NAME: &str = "tidewatch";

/// CLI subcommand names used to spawn and detect the daemon
pub const DAEMON_SUBCOMMAND: &str = "daemon";
pub const DAEMON_RUN_SUBCOMMAND: &str = "run";

/// Environment variable set on the detached daemon child
pub const DAEMON_CHILD_ENV: &str = "TIDEWATCH_DAEMON_CHILD";

/// Readiness line written by the daemon child to its parent
pub const DAEMON_READY_LINE: &str = "READY";

/// How long `daemon start` waits for the readiness line
pub const DAEMON_START_TIMEOUT: Duration = Duration::from_secs(30);

/// File names under the configuration / data directories
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATE_FILE_NAME: &str = "state.toml";
pub const IPC_SOCKET_NAME: &str = "tidewatch.sock";

/// IPC client read timeout
pub const IPC_TIMEOUT: Duration = Duration::from_secs(10);

//
// Marker grammar: `[HH:MM:SS(.fff) T] [Ocean Trip] Next boat is in N minutes...`
//

/// Category literal inside the second bracket group
pub const MARKER_CATEGORY: &str = "Ocean Trip";

/// Event phrase preceding ` in <N> minute`
pub const MARKER_PHRASE: &str = "Next boat is";

/// Minutes assumed when the count is present but unrepresentable
pub const DEFAULT_MINUTES_UNTIL_EVENT: u32 = 60;

//
// Date disambiguation windows (hours, local log clock)
//

/// Times strictly before this hour belong to the early-morning window
pub const EARLY_MORNING_END_HOUR: u32 = 6;

/// Times at or after this hour may be attributed to yesterday after midnight
pub const LATE_NIGHT_START_HOUR: u32 = 22;

/// Lower bound of yesterday's late-night window when ordering across midnight
pub const ROLLOVER_LATE_NIGHT_HOUR: u32 = 20;

//
// Scheduling
//

/// Bounds for the poll interval, in minutes
pub const POLL_INTERVAL_MIN_MINUTES: u32 = 1;
pub const POLL_INTERVAL_MAX_MINUTES: u32 = 60;
pub const DEFAULT_POLL_INTERVAL_MINUTES: u32 = 5;

/// Delay between detecting a new entry and running the configured action
pub const ACTION_GRACE_DELAY: Duration = Duration::from_secs(60);

/// Countdown cadence
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Remaining time at or below which the pre-event action fires
pub const PRE_EVENT_THRESHOLD: Duration = Duration::from_secs(60);

/// Candidate targets closer than this to the current target are ignored
pub const RETARGET_TOLERANCE: Duration = Duration::from_secs(60);

/// Default glob used to select candidate log files
pub const DEFAULT_FILE_PATTERN: &str = "*.log";

/// Prefix marking an action string as a diagnostic echo
pub const ECHO_ACTION_PREFIX: &str = "/echo";

/// Event type identifier for detection output
pub const EVENT_ENTRY_DETECTED: &str = "entry_detected";
