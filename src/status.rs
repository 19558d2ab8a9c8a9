//! Status surface for user-facing feedback
//!
//! The capture session and controller do not talk to a display directly;
//! they push status text, timer ticks, busy toggles, and rendered report
//! markup through this trait. The front end decides how to show them.

/// Sink for user-facing session feedback
///
/// Implementations must be cheap and non-blocking; everything here is
/// called from the session's own task.
pub trait StatusSink: Send + Sync {
    /// A short status line, e.g. 準備就緒 / 正在錄音... / 處理中...
    fn status(&self, message: &str);

    /// Elapsed recording time, `mm:ss`, emitted once per second while
    /// recording.
    fn timer(&self, elapsed: &str);

    /// Busy indicator for a pending upload or dispatch. Record/send
    /// affordances are disabled while busy.
    fn busy(&self, busy: bool);

    /// The freshly rendered report fragment, ready to mount.
    fn report_html(&self, html: &str);
}
