use std::time::Duration;

use tracing::{debug, error};

use crate::api::ApiClient;
use crate::config::Config;
use crate::mapper::map_readings;
use crate::registry::{Registry, RegistryReconciler};
use crate::scheduler::{PollCycle, PollScheduler};
use crate::session::SessionManager;
use crate::{Error, Result};

/// What a completed cycle touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub hubs: usize,
    pub readings: usize,
    pub pruned: usize,
}

pub struct PollerBuilder<R: Registry> {
    config: Config,
    registry: R,
    base_url: Option<String>,
}

impl<R: Registry> PollerBuilder<R> {
    pub fn new(config: Config, registry: R) -> Self {
        Self {
            config,
            registry,
            base_url: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Fails with [`Error::Config`] when credentials are missing. That error is
    /// terminal for this instance: polling must not start.
    pub fn build(self) -> Result<Poller<R>> {
        let credentials = self.config.credentials().inspect_err(|e| {
            error!(error = %e, "refusing to start polling");
        })?;

        let base_url = self
            .base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.config.base_url());
        let api = ApiClient::new(base_url, self.config.request_timeout())?;

        Ok(Poller {
            api,
            session: SessionManager::new(credentials, self.config.account_override()),
            reconciler: RegistryReconciler::new(
                self.registry,
                self.config.name_overrides.clone(),
                self.config.battery_threshold(),
            ),
            device_codes: self.config.device_codes(),
            sensor_codes: self.config.sensor_codes(),
            refresh_interval: self.config.refresh_interval(),
        })
    }
}

/// One account's polling context: session, caches and registry mapping.
pub struct Poller<R: Registry> {
    api: ApiClient,
    session: SessionManager,
    reconciler: RegistryReconciler<R>,
    device_codes: Vec<String>,
    sensor_codes: Vec<String>,
    refresh_interval: Duration,
}

impl<R: Registry> Poller<R> {
    pub fn builder(config: Config, registry: R) -> PollerBuilder<R> {
        PollerBuilder::new(config, registry)
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn registry(&self) -> &R {
        self.reconciler.registry()
    }

    pub fn registry_mut(&mut self) -> &mut R {
        self.reconciler.registry_mut()
    }

    pub fn reconciler(&self) -> &RegistryReconciler<R> {
        &self.reconciler
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Hand over an entry the host kept from an earlier run.
    pub fn adopt(&mut self, key: impl Into<String>, handle: R::Handle) {
        self.reconciler.adopt(key, handle);
    }

    /// A scheduler ticking at this poller's refresh interval.
    pub fn scheduler(&self) -> PollScheduler {
        PollScheduler::new(self.refresh_interval)
    }

    /// Fetch every hub, reconcile its readings, then prune unseen entries.
    ///
    /// The first failure aborts the cycle. Hubs reconciled before it stay
    /// applied and nothing is pruned.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.reconciler.begin_cycle();

        let session = self.session.ensure_session(&self.api).await?.clone();
        let account_id = self.session.resolve_account_id(&session)?;

        let hubs = self.api.list_hubs(&session, &account_id).await;
        let hubs = self.check_auth(hubs)?;

        let mut report = CycleReport {
            hubs: hubs.len(),
            ..CycleReport::default()
        };
        for hub in &hubs {
            let devices = self.api.get_hub_devices(&session, &account_id, &hub.id).await;
            let devices = self.check_auth(devices)?;
            let readings = map_readings(&devices, &self.device_codes, &self.sensor_codes);
            debug!(hub = %hub.id, devices = devices.len(), readings = readings.len(), "hub fetched");
            for reading in &readings {
                self.reconciler.apply(reading);
            }
            report.readings += readings.len();
        }

        report.pruned = self.reconciler.finish_cycle();
        Ok(report)
    }

    fn check_auth<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.as_ref().is_err_and(Error::is_auth) {
            self.session.invalidate();
        }
        result
    }
}

impl<R: Registry> PollCycle for Poller<R> {
    async fn poll_once(&mut self) -> Result<()> {
        let report = self.run_cycle().await?;
        debug!(
            hubs = report.hubs,
            readings = report.readings,
            pruned = report.pruned,
            "poll cycle complete"
        );
        Ok(())
    }
}
