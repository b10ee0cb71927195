//! Scrape orchestration
//!
//! Ties the walker, the rule engine and the snapshot converter together,
//! reloads the configuration file when it changes and enforces the start
//! delay.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::collector::{BeanServer, JolokiaClient, LocalBeanServer};
use crate::config::Config;
use crate::error::{AppResult, ExporterError};
use crate::metrics::{ExporterMetrics, ScrapeSummary};
use crate::scraper::Scraper;
use crate::transformer::{convert, MetricSnapshot, RuleEngine};

/// Everything derived from one configuration
pub struct ExporterState {
    config: Config,
    scraper: Scraper,
    engine: RuleEngine,
}

impl ExporterState {
    /// Build the scraper and rule engine for a configuration.
    ///
    /// Without a remote URL the in-process bean server is scraped.
    pub fn build(config: Config, local: &Arc<LocalBeanServer>) -> AppResult<Self> {
        let server: Arc<dyn BeanServer> = match config.remote_url() {
            Some(url) => {
                let mut client = JolokiaClient::new(url, config.timeout_ms)?;
                if let (Some(username), Some(password)) = (&config.username, &config.password) {
                    client = client.with_auth(username, password);
                }
                Arc::new(client)
            }
            None => Arc::clone(local) as Arc<dyn BeanServer>,
        };

        let scraper = Scraper::new(
            server,
            config.include_patterns()?,
            config.exclude_patterns()?,
            config.attribute_filter()?,
        );
        let engine = RuleEngine::new(config.rule_set()?)
            .with_lowercase_names(config.lowercase_output_name)
            .with_lowercase_labels(config.lowercase_output_label_names);

        Ok(Self {
            config,
            scraper,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }
}

/// Result of [`Exporter::scrape_once`]
#[derive(Debug, Clone)]
pub struct ScrapeOutput {
    /// Bean metrics, empty when the scrape failed
    pub snapshots: Vec<MetricSnapshot>,
    pub summary: ScrapeSummary,
}

/// JMX to metrics exporter
pub struct Exporter {
    state: RwLock<Arc<ExporterState>>,
    local: Arc<LocalBeanServer>,
    config_file: Option<PathBuf>,
    last_modified: Mutex<Option<SystemTime>>,
    started: Instant,
    metrics: ExporterMetrics,
}

impl Exporter {
    /// Create an exporter scraping a fresh, empty in-process bean server
    /// unless the configuration names a remote agent.
    pub fn new(config: Config) -> AppResult<Self> {
        Self::with_local_server(config, Arc::new(LocalBeanServer::new()))
    }

    /// Create an exporter over a caller-populated in-process bean server
    pub fn with_local_server(config: Config, local: Arc<LocalBeanServer>) -> AppResult<Self> {
        let state = ExporterState::build(config, &local)?;
        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            local,
            config_file: None,
            last_modified: Mutex::new(None),
            started: Instant::now(),
            metrics: ExporterMetrics::new(),
        })
    }

    /// Load the exporter from a configuration file and watch it for changes
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let config = Config::load(path)?;
        Ok(Self::new(config)?.watching(path))
    }

    /// Reload from `path` whenever its modification time changes
    pub fn watching(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        *self
            .last_modified
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = modified(&path);
        self.config_file = Some(path);
        self
    }

    /// The in-process bean server
    pub fn local_server(&self) -> &Arc<LocalBeanServer> {
        &self.local
    }

    /// Current configuration and derived state
    pub fn current(&self) -> Arc<ExporterState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Reload the configuration file if it changed since the last check.
    ///
    /// A rejected file keeps the previous configuration in place. Returns
    /// true when a new configuration was installed.
    pub fn reload_if_changed(&self) -> bool {
        let Some(path) = &self.config_file else {
            return false;
        };

        let current = modified(path);
        {
            let mut last = self
                .last_modified
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last == current {
                return false;
            }
            *last = current;
        }

        let rebuilt = Config::load(path)
            .map_err(Into::into)
            .and_then(|config| ExporterState::build(config, &self.local));

        match rebuilt {
            Ok(state) => {
                *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
                self.metrics.record_reload_success();
                info!(path = %path.display(), "Configuration reloaded");
                true
            }
            Err(e) => {
                self.metrics.record_reload_failure();
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Configuration reload failed, keeping previous configuration"
                );
                false
            }
        }
    }

    /// Run one scrape.
    ///
    /// Connection-level failures do not fail the call: they yield no bean
    /// metrics and set the error flag. Colliding label sets do fail it.
    pub async fn scrape_once(&self) -> Result<ScrapeOutput, ExporterError> {
        self.reload_if_changed();
        let state = self.current();

        let delay = Duration::from_secs(state.config.start_delay_seconds);
        let elapsed = self.started.elapsed();
        if elapsed < delay {
            let remaining_secs = (delay - elapsed).as_secs_f64().ceil() as u64;
            return Err(ExporterError::StartingUp { remaining_secs });
        }

        let start = Instant::now();
        let mut receiver = state.engine.receiver();
        let result = state.scraper.scrape(&mut receiver).await;
        let (samples, tracker) = receiver.finish();

        let mut summary = ScrapeSummary {
            cached_beans: tracker.cached_count(),
            ..ScrapeSummary::default()
        };

        let snapshots = match result {
            Ok(stats) => {
                state.engine.cache().evict_stale(&tracker);
                summary.bean_failures = stats.bean_failures;
                convert(&samples)?
            }
            Err(e) => {
                warn!(error = %e, "JMX scrape failed");
                summary.error = true;
                Vec::new()
            }
        };

        summary.duration_seconds = start.elapsed().as_secs_f64();
        debug!(
            duration_seconds = summary.duration_seconds,
            metrics = snapshots.len(),
            error = summary.error,
            "Scrape complete"
        );

        Ok(ScrapeOutput { snapshots, summary })
    }

    /// Bean metrics followed by the exporter's own metrics
    pub async fn collect(&self) -> Result<Vec<MetricSnapshot>, ExporterError> {
        let output = self.scrape_once().await?;
        let mut snapshots = output.snapshots;
        snapshots.extend(self.metrics.snapshots(&output.summary));
        Ok(snapshots)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
