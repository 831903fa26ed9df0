use std::str::FromStr;
use std::time::Duration;

use recordport_core::batching::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use recordport_core::duplicate_detection::DuplicateStrategy;
use recordport_core::validation::ImportKind;

use crate::error::PipelineError;
use crate::executor::ExecutorOptions;
use crate::retry::RetryConfig;

pub const DEFAULT_INVITATION_BATCH_SIZE: usize = 10;
pub const DEFAULT_INVITATION_DELAY_MS: u64 = 1000;

/// Import pipeline configuration loaded from environment variables.
///
/// Defaults: no retries, no pause between ordinary batches, and a
/// one-second pause between invitation batches.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Records per batch for most kinds.
    pub batch_size: usize,
    /// Records per batch for user invitations.
    pub invitation_batch_size: usize,
    /// Pause between invitation batches (downstream email rate limit).
    pub invitation_delay: Duration,
    /// Pause between batches of other kinds.
    pub inter_batch_delay: Duration,
    pub retry: RetryConfig,
    /// Default action for every detected duplicate.
    pub duplicate_strategy: DuplicateStrategy,
    /// Query the store for duplicates when entering the preview stage.
    pub detect_duplicates: bool,
    /// Drop rows with validation errors instead of refusing to commit
    /// (non-interactive runs only).
    pub exclude_invalid_rows: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            invitation_batch_size: DEFAULT_INVITATION_BATCH_SIZE,
            invitation_delay: Duration::from_millis(DEFAULT_INVITATION_DELAY_MS),
            inter_batch_delay: Duration::ZERO,
            retry: RetryConfig::default(),
            duplicate_strategy: DuplicateStrategy::Skip,
            detect_duplicates: true,
            exclude_invalid_rows: false,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `IMPORT_BATCH_SIZE`              | `25`    |
    /// | `IMPORT_INVITATION_BATCH_SIZE`   | `10`    |
    /// | `IMPORT_INVITATION_DELAY_MS`     | `1000`  |
    /// | `IMPORT_INTER_BATCH_DELAY_MS`    | `0`     |
    /// | `IMPORT_MAX_BATCH_RETRIES`       | `0`     |
    /// | `IMPORT_RETRY_INITIAL_DELAY_MS`  | `500`   |
    /// | `IMPORT_DUPLICATE_STRATEGY`      | `skip`  |
    /// | `IMPORT_DETECT_DUPLICATES`       | `true`  |
    /// | `IMPORT_EXCLUDE_INVALID_ROWS`    | `false` |
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let batch_size = batch_size_var(&lookup, "IMPORT_BATCH_SIZE", defaults.batch_size)?;
        let invitation_batch_size = batch_size_var(
            &lookup,
            "IMPORT_INVITATION_BATCH_SIZE",
            defaults.invitation_batch_size,
        )?;
        let invitation_delay_ms: u64 = parse_var(
            &lookup,
            "IMPORT_INVITATION_DELAY_MS",
            DEFAULT_INVITATION_DELAY_MS,
        )?;
        let inter_batch_delay_ms: u64 = parse_var(&lookup, "IMPORT_INTER_BATCH_DELAY_MS", 0)?;
        let max_retries: u32 =
            parse_var(&lookup, "IMPORT_MAX_BATCH_RETRIES", defaults.retry.max_retries)?;
        let retry_initial_delay_ms: u64 = parse_var(
            &lookup,
            "IMPORT_RETRY_INITIAL_DELAY_MS",
            defaults.retry.initial_delay.as_millis() as u64,
        )?;

        let duplicate_strategy = match lookup("IMPORT_DUPLICATE_STRATEGY") {
            Some(raw) => raw.parse::<DuplicateStrategy>().map_err(|e| {
                PipelineError::Config(format!("IMPORT_DUPLICATE_STRATEGY: {e}"))
            })?,
            None => defaults.duplicate_strategy,
        };
        let detect_duplicates =
            bool_var(&lookup, "IMPORT_DETECT_DUPLICATES", defaults.detect_duplicates)?;
        let exclude_invalid_rows = bool_var(
            &lookup,
            "IMPORT_EXCLUDE_INVALID_ROWS",
            defaults.exclude_invalid_rows,
        )?;

        Ok(Self {
            batch_size,
            invitation_batch_size,
            invitation_delay: Duration::from_millis(invitation_delay_ms),
            inter_batch_delay: Duration::from_millis(inter_batch_delay_ms),
            retry: RetryConfig {
                max_retries,
                initial_delay: Duration::from_millis(retry_initial_delay_ms),
                ..defaults.retry
            },
            duplicate_strategy,
            detect_duplicates,
            exclude_invalid_rows,
        })
    }

    /// Batch size used when committing `kind`.
    pub fn batch_size_for(&self, kind: ImportKind) -> usize {
        if kind.is_rate_limited() {
            self.invitation_batch_size
        } else {
            self.batch_size
        }
    }

    /// Pause between batches when committing `kind`.
    pub fn delay_for(&self, kind: ImportKind) -> Duration {
        if kind.is_rate_limited() {
            self.invitation_delay
        } else {
            self.inter_batch_delay
        }
    }

    pub fn executor_options(&self, kind: ImportKind) -> ExecutorOptions {
        ExecutorOptions {
            batch_size: self.batch_size_for(kind),
            inter_batch_delay: self.delay_for(kind),
            retry: self.retry.clone(),
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::Config(format!("{name} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

fn batch_size_var<F>(lookup: &F, name: &str, default: usize) -> Result<usize, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    let size: usize = parse_var(lookup, name, default)?;
    if (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(PipelineError::Config(format!(
            "{name} must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, got {size}"
        )))
    }
}

fn bool_var<F>(lookup: &F, name: &str, default: bool) -> Result<bool, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => recordport_core::validation::rules::parse_bool_token(&raw)
            .ok_or_else(|| PipelineError::Config(format!("{name} must be a boolean, got '{raw}'"))),
        None => Ok(default),
    }
}
