/// Trait for reporting migration progress.
///
/// The CLI implements it with indicatif. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_plan_start(&self) {}
    fn on_plan_complete(&self, _pages: usize, _duration_secs: f64) {}
    fn on_submit_start(&self, _total_pages: usize) {}
    fn on_page_done(&self, _title: &str, _pages_done: usize, _total_pages: usize) {}
    fn on_submit_complete(&self, _pages_created: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
