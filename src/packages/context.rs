use crate::config::{HostLayout, Settings};
use crate::error::Result;
use crate::lock::LockTiming;
use crate::process::{CommandRunner, SystemRunner};
use crate::tracking::TrackingStore;
use crate::utils::retry::RetryPolicy;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Everything a backend needs from the outside world.
#[derive(Clone)]
pub struct BackendContext {
    pub runner: Arc<dyn CommandRunner>,
    pub layout: HostLayout,
    pub tracking: TrackingStore,
    pub lock_timing: LockTiming,
    pub install_retry: RetryPolicy,
    pub download_retry: RetryPolicy,
}

impl BackendContext {
    /// Defaults suitable for the real system, tracking under `data_dir`.
    pub fn new(runner: Arc<dyn CommandRunner>, layout: HostLayout, data_dir: &Path) -> Self {
        Self {
            runner,
            layout,
            tracking: TrackingStore::for_data_dir(data_dir),
            lock_timing: LockTiming::default(),
            install_retry: RetryPolicy::new(5, Duration::from_millis(500)),
            download_retry: RetryPolicy::new(3, Duration::from_secs(1)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let data_dir = settings.data_dir()?;
        let layout = HostLayout::system(settings.staging_root());
        Ok(Self::new(Arc::new(SystemRunner), layout, &data_dir)
            .with_lock_timing(LockTiming {
                poll_interval: settings.lock_poll_interval(),
                notice_delay: settings.lock_notice_delay(),
                timeout: settings.lock_timeout(),
            })
            .with_install_retry(settings.install_retry())
            .with_download_retry(settings.download_retry()))
    }

    pub fn with_lock_timing(mut self, timing: LockTiming) -> Self {
        self.lock_timing = timing;
        self
    }

    pub fn with_install_retry(mut self, policy: RetryPolicy) -> Self {
        self.install_retry = policy;
        self
    }

    pub fn with_download_retry(mut self, policy: RetryPolicy) -> Self {
        self.download_retry = policy;
        self
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }
}
