use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::model::{Encryption, FilterCriteria, LatestOnly, DEFAULT_INVENTORY_CONFIG_NAME};

/// Accepted `--start` / `--end` format.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default fraction of copy tasks that must succeed.
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.8;

/// Smallest part size S3 accepts for all but the last part of a multipart upload.
pub const MIN_PART_SIZE_MB: u64 = 5;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Engine tuning ─────────────────────────────────────────────

/// Timing and sizing knobs of the engine.
///
/// Reads from environment variables with optional profile prefix.
/// When `BULKCOPY_PROFILE=PROD`, checks `PROD_BULKCOPY_JOB_POLL_SECS` before
/// `BULKCOPY_JOB_POLL_SECS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTuning {
    /// Manifest lookups after the first one before giving up.
    pub manifest_retries: u32,
    /// Delay before the first status poll of a new job.
    pub job_warmup: Duration,
    /// Delay between job status polls.
    pub job_poll_interval: Duration,
    /// Part size of the filtered manifest upload, in bytes.
    pub upload_part_size: usize,
    /// Batch job priority.
    pub job_priority: i32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            manifest_retries: 24,
            job_warmup: Duration::from_secs(15),
            job_poll_interval: Duration::from_secs(60),
            upload_part_size: 64 * 1024 * 1024,
            job_priority: 10,
        }
    }
}

impl EngineTuning {
    pub fn from_env() -> Self {
        let profile = env_opt("BULKCOPY_PROFILE")
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
        Self::from_env_profiled(&profile)
    }

    pub fn from_env_profiled(profile: &str) -> Self {
        let defaults = Self::default();
        let part_mb = profiled_env_u64(profile, "BULKCOPY_UPLOAD_PART_MB", 64).max(MIN_PART_SIZE_MB);
        Self {
            manifest_retries: profiled_env_u32(
                profile,
                "BULKCOPY_MANIFEST_RETRIES",
                defaults.manifest_retries,
            ),
            job_warmup: Duration::from_secs(profiled_env_u64(
                profile,
                "BULKCOPY_JOB_WARMUP_SECS",
                defaults.job_warmup.as_secs(),
            )),
            job_poll_interval: Duration::from_secs(profiled_env_u64(
                profile,
                "BULKCOPY_JOB_POLL_SECS",
                defaults.job_poll_interval.as_secs(),
            )),
            upload_part_size: (part_mb * 1024 * 1024) as usize,
            job_priority: profiled_env_u32(profile, "BULKCOPY_JOB_PRIORITY", 10) as i32,
        }
    }
}

// ── Migration config ──────────────────────────────────────────

/// Unvalidated inputs as they arrive from the command line.
#[derive(Debug, Clone, Default)]
pub struct MigrationArgs {
    pub region: String,
    pub account_id: String,
    pub role_arn: String,
    pub source_bucket: String,
    pub destination_bucket: Option<String>,
    pub inventory_config: String,
    pub retry_interval: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub latest_only: Option<String>,
    pub kms_id: Option<String>,
    pub success_threshold: f64,
}

/// Validated, immutable settings of one migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub region: String,
    pub account_id: String,
    pub role_arn: String,
    pub source_bucket: String,
    pub destination_bucket: Option<String>,
    pub inventory_config: String,
    pub retry_interval: Duration,
    pub filters: FilterCriteria,
    pub success_threshold: f64,
    pub tuning: EngineTuning,
}

impl MigrationConfig {
    pub fn from_args(args: MigrationArgs, tuning: EngineTuning) -> Result<Self> {
        validate_account_id(&args.account_id)?;
        validate_role_arn(&args.role_arn)?;
        if args.source_bucket.trim().is_empty() {
            return Err(MigrationError::InvalidArgument("source bucket is required".into()));
        }
        if !(0.0..=1.0).contains(&args.success_threshold) {
            return Err(MigrationError::InvalidArgument(format!(
                "success threshold {} must be between 0 and 1",
                args.success_threshold
            )));
        }

        let retry_interval = parse_duration(&args.retry_interval)?;
        let start = parse_optional_datetime("start", args.start.as_deref())?;
        let end = parse_optional_datetime("end", args.end.as_deref())?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(MigrationError::InvalidArgument(format!(
                    "start '{s}' is after end '{e}'"
                )));
            }
        }
        let latest_only = match args.latest_only.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(LatestOnly::parse(v)?),
        };
        let encryption = Encryption::from_key_id(args.kms_id.as_deref().unwrap_or_default());

        let inventory_config = if args.inventory_config.trim().is_empty() {
            DEFAULT_INVENTORY_CONFIG_NAME.to_string()
        } else {
            args.inventory_config.trim().to_string()
        };

        Ok(Self {
            region: args.region,
            account_id: args.account_id,
            role_arn: args.role_arn,
            source_bucket: args.source_bucket,
            destination_bucket: args.destination_bucket.filter(|b| !b.trim().is_empty()),
            inventory_config,
            retry_interval,
            filters: FilterCriteria {
                start,
                end,
                latest_only,
                encryption,
            },
            success_threshold: args.success_threshold,
            tuning,
        })
    }

    /// Only the default configuration name may be created or enabled by the tool.
    pub fn owns_inventory_config(&self) -> bool {
        self.inventory_config == DEFAULT_INVENTORY_CONFIG_NAME
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Migration config loaded:");
        tracing::info!("  region:      {}", self.region);
        tracing::info!("  source:      {}", self.source_bucket);
        tracing::info!(
            "  destination: {}",
            self.destination_bucket.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  inventory:   {} (owned={})",
            self.inventory_config,
            self.owns_inventory_config()
        );
        tracing::info!("  retry:       {:?}", self.retry_interval);
        tracing::info!("  threshold:   {}", self.success_threshold);
    }
}

fn account_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{12}$").expect("valid account regex"))
}

fn role_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:\d{12}|(arn:(aws|aws-us-gov|aws-cn):iam::\d{12}(?:|:(?:role/[0-9A-Za-z\+\.@_,-]{1,64}))))$",
        )
        .expect("valid role regex")
    })
}

pub fn validate_account_id(account_id: &str) -> Result<()> {
    if account_regex().is_match(account_id) {
        Ok(())
    } else {
        Err(MigrationError::InvalidArgument(format!(
            "account '{account_id}' must be a 12 digit number"
        )))
    }
}

pub fn validate_role_arn(role_arn: &str) -> Result<()> {
    if role_regex().is_match(role_arn) {
        Ok(())
    } else {
        Err(MigrationError::InvalidArgument(format!(
            "role '{role_arn}' must be an IAM role ARN, eg. arn:aws:iam::<ACCOUNT_NUM>:role/BatchOperationsCopyRole"
        )))
    }
}

fn parse_optional_datetime(label: &str, value: Option<&str>) -> Result<Option<NaiveDateTime>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => NaiveDateTime::parse_from_str(v, DATETIME_FORMAT)
            .map(Some)
            .map_err(|e| {
                MigrationError::InvalidArgument(format!(
                    "invalid {label} date time '{v}': {e}, expected format 'YYYY-MM-DD HH:MM:SS'"
                ))
            }),
    }
}

/// Parse a Go-style duration such as `1h`, `30m`, `1h30m` or `2.5s`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = || MigrationError::InvalidArgument(format!("invalid duration '{value}'"));
    let input = value.trim();
    if input.is_empty() {
        return Err(invalid());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = input;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += number * seconds_per_unit;
    }

    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "BULKCOPY_PROFILE",
            "BULKCOPY_MANIFEST_RETRIES",
            "BULKCOPY_JOB_WARMUP_SECS",
            "BULKCOPY_JOB_POLL_SECS",
            "BULKCOPY_UPLOAD_PART_MB",
            "BULKCOPY_JOB_PRIORITY",
            "TEST_BULKCOPY_JOB_POLL_SECS",
        ] {
            env::remove_var(key);
        }
    }

    fn args() -> MigrationArgs {
        MigrationArgs {
            region: "us-east-1".into(),
            account_id: "111122223333".into(),
            role_arn: "arn:aws:iam::111122223333:role/BatchOperationsCopyRole".into(),
            source_bucket: "source".into(),
            destination_bucket: Some("target".into()),
            inventory_config: DEFAULT_INVENTORY_CONFIG_NAME.into(),
            retry_interval: "1h".into(),
            start: None,
            end: None,
            latest_only: None,
            kms_id: Some("SSE-S3".into()),
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }

    #[test]
    fn tuning_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        let tuning = EngineTuning::from_env();
        assert_eq!(tuning, EngineTuning::default());
        assert_eq!(tuning.manifest_retries, 24);
        assert_eq!(tuning.job_warmup, Duration::from_secs(15));
        assert_eq!(tuning.job_poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn tuning_profile_overrides_and_part_floor() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("BULKCOPY_PROFILE", "test");
        env::set_var("TEST_BULKCOPY_JOB_POLL_SECS", "5");
        env::set_var("BULKCOPY_UPLOAD_PART_MB", "1");

        let tuning = EngineTuning::from_env();
        assert_eq!(tuning.job_poll_interval, Duration::from_secs(5));
        assert_eq!(tuning.upload_part_size, 5 * 1024 * 1024);
        clear_env();
    }

    #[test]
    fn go_style_durations() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_duration_is_rejected() {
        let err = parse_duration("99999999999999999999h").unwrap_err();
        assert!(matches!(err, MigrationError::InvalidArgument(_)));
    }

    #[test]
    fn valid_args_build_config() {
        let mut a = args();
        a.start = Some("2023-09-30 12:00:00".into());
        a.end = Some("2023-12-31 12:00:00".into());
        a.latest_only = Some("yes".into());
        let cfg = MigrationConfig::from_args(a, EngineTuning::default()).unwrap();
        assert!(cfg.owns_inventory_config());
        assert_eq!(cfg.filters.latest_only, Some(LatestOnly::Yes));
        assert_eq!(cfg.filters.encryption, Encryption::S3Managed);
        assert!(cfg.filters.start.is_some() && cfg.filters.end.is_some());
        assert_eq!(cfg.retry_interval, Duration::from_secs(3600));
    }

    #[test]
    fn invalid_args_are_rejected() {
        let mut a = args();
        a.account_id = "12345".into();
        assert!(MigrationConfig::from_args(a, EngineTuning::default()).is_err());

        let mut a = args();
        a.role_arn = "not-a-role".into();
        assert!(MigrationConfig::from_args(a, EngineTuning::default()).is_err());

        let mut a = args();
        a.start = Some("2023/09/30".into());
        assert!(MigrationConfig::from_args(a, EngineTuning::default()).is_err());

        let mut a = args();
        a.start = Some("2024-01-01 00:00:00".into());
        a.end = Some("2023-01-01 00:00:00".into());
        assert!(MigrationConfig::from_args(a, EngineTuning::default()).is_err());

        let mut a = args();
        a.success_threshold = 1.5;
        assert!(MigrationConfig::from_args(a, EngineTuning::default()).is_err());

        let mut a = args();
        a.latest_only = Some("sometimes".into());
        assert!(MigrationConfig::from_args(a, EngineTuning::default()).is_err());
    }

    #[test]
    fn non_default_config_is_not_owned() {
        let mut a = args();
        a.inventory_config = "team-inventory".into();
        let cfg = MigrationConfig::from_args(a, EngineTuning::default()).unwrap();
        assert!(!cfg.owns_inventory_config());
    }

    #[test]
    fn bare_account_is_accepted_as_role() {
        assert!(validate_role_arn("111122223333").is_ok());
        assert!(validate_role_arn("arn:aws-cn:iam::111122223333:role/copy").is_ok());
    }
}
