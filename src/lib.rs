pub mod anomaly;
pub mod assignment;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod matcher;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod samples;
pub mod trend;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use anomaly::{AnomalyClassifier, BaselineCurve, Classification, ExpectedCurve, Recommendations, Thresholds};
pub use assignment::{AssignmentDraft, ExerciseUpdate, ProgramAssignmentService};
pub use catalog::ProgramCatalog;
pub use config::{ConfigError, EngineConfig};
pub use db::{PersistenceStore, SqliteStore};
pub use error::{PersistenceError, RehabError, ValidationError};
pub use matcher::{match_injury, ProgramMatch};
pub use monitor::ProgressMonitor;
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use samples::ProgressSampleStore;
pub use trend::TrendAggregator;

use models::AnomalyAlert;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Rehab(#[from] RehabError),

  #[error("Failed to start runtime: {0}")]
  Runtime(#[from] std::io::Error),

  #[error("Failed to encode report: {0}")]
  Report(#[from] serde_json::Error),
}

impl From<PersistenceError> for RunError {
  fn from(e: PersistenceError) -> Self {
    RunError::Rehab(e.into())
  }
}

impl From<ValidationError> for RunError {
  fn from(e: ValidationError) -> Self {
    RunError::Rehab(e.into())
  }
}

/// One monitoring pass: load configuration, open the database, rebuild the
/// in-memory sample store, scan every patient and print the alert list
pub fn run() {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  if let Err(e) = run_once() {
    error!(error = %e, "Monitoring pass failed");
    std::process::exit(1);
  }
}

fn run_once() -> Result<(), RunError> {
  let config = EngineConfig::load()?;
  let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

  let alerts = runtime.block_on(monitor_pass(&config))?;
  println!("{}", serde_json::to_string_pretty(&alerts)?);
  Ok(())
}

async fn monitor_pass(config: &EngineConfig) -> Result<Vec<AnomalyAlert>, RunError> {
  let pool = db::initialize_db(&config.database_url).await?;
  let store = SqliteStore::new(pool);

  // Configured programs win; otherwise use what is stored, seeding the built-in
  // catalog into an empty database
  let catalog = match config.programs {
    Some(_) => {
      let catalog = config.catalog()?;
      store.save_catalog(&catalog).await?;
      catalog
    }
    None => {
      let stored = store.load_catalog().await?;
      if stored.is_empty() {
        let catalog = config.catalog()?;
        store.save_catalog(&catalog).await?;
        catalog
      } else {
        stored
      }
    }
  };

  let samples = ProgressSampleStore::from_samples(store.load_progress_samples().await?)?;
  let patients = store.load_patients().await?;
  info!(patients = patients.len(), programs = catalog.len(), "Loaded monitoring state");

  let monitor = ProgressMonitor::new(
    Arc::new(samples),
    Arc::new(catalog),
    config.classifier()?,
    config.baselines.clone(),
  );
  for patient in &patients {
    if let Some(assignment) = store.load_program_assignment(patient.id).await? {
      monitor.assign_program(&assignment);
    }
  }
  let alerts = monitor.scan(&patients, config.trend_window);

  if let Some(url) = config.webhook()? {
    let notifier = WebhookNotifier::new(url);
    for alert in &alerts {
      monitor.request_checkup(alert, &notifier);
    }
    notifier.flush().await;
  }

  store.pool().close().await;
  Ok(alerts)
}
