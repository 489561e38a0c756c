//! Schedule configuration parsing.
//!
//! ```kdl
//! timezone "Asia/Seoul"
//! job "daily_development" cron="0 9 * * *" kind="develop"
//! job "health_check" cron="0 * * * *" kind="health"
//! ```

use chrono_tz::Tz;
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::cron::CronExpr;
use crate::kdl_util::{first_string_arg, string_prop};
use crate::{ConfigError, ConfigResult};

/// What a scheduled job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Run the full pipeline once.
    Develop,
    /// Probe backend health and credentials.
    Health,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Develop => write!(f, "develop"),
            JobKind::Health => write!(f, "health"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub name: String,
    pub cron: CronExpr,
    pub kind: JobKind,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub timezone: Tz,
    pub jobs: Vec<ScheduledJob>,
}

impl ScheduleConfig {
    /// Two development runs (daily and weekdays) plus an hourly health probe.
    pub fn default_for(timezone: Tz) -> Self {
        let job = |name: &str, cron: &str, kind| ScheduledJob {
            name: name.to_string(),
            cron: cron.parse().unwrap(),
            kind,
        };

        Self {
            timezone,
            jobs: vec![
                job("daily_development", "0 9 * * *", JobKind::Develop),
                job("weekday_development", "0 10 * * mon-fri", JobKind::Develop),
                job("health_check", "0 * * * *", JobKind::Health),
            ],
        }
    }

    /// Load from a KDL file, or the default schedule when no file is given.
    pub fn load(path: Option<&Path>, default_timezone: Tz) -> ConfigResult<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                parse_schedule(&text, default_timezone)
            }
            None => Ok(Self::default_for(default_timezone)),
        }
    }
}

/// Parse a schedule from KDL text. `timezone` is optional and defaults to `default_timezone`.
pub fn parse_schedule(kdl: &str, default_timezone: Tz) -> ConfigResult<ScheduleConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut timezone = default_timezone;
    let mut jobs = Vec::new();
    let mut seen = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "timezone" => {
                let name = first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("timezone name".to_string()))?;
                timezone = name.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "timezone".to_string(),
                    message: format!("unknown timezone '{}'", name),
                })?;
            }
            "job" => {
                let job = parse_job(node)?;
                if !seen.insert(job.name.clone()) {
                    return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
                }
                jobs.push(job);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(ScheduleConfig { timezone, jobs })
}

fn parse_job(node: &KdlNode) -> ConfigResult<ScheduledJob> {
    let name =
        first_string_arg(node).ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    let cron: CronExpr = string_prop(node, "cron")
        .ok_or_else(|| ConfigError::MissingField(format!("cron for job '{}'", name)))?
        .parse()?;

    let kind = match string_prop(node, "kind").as_deref() {
        None | Some("develop") => JobKind::Develop,
        Some("health") => JobKind::Health,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: format!("kind of job '{}'", name),
                message: format!("unknown job kind: {}", other),
            });
        }
    };

    Ok(ScheduledJob { name, cron, kind })
}
