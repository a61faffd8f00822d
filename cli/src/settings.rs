//! Command-line and environment settings shared by all commands.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use kvbulk_core::OrchestratorConfig;
use kvbulk_dynamo::DynamoConfig;

use crate::parse_flag;

/// Table used by the user commands when `--table` and `USERS_TABLE` are unset.
pub const DEFAULT_TABLE: &str = "test-table";

/// Storage backend selected with `--backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process store; contents are lost on exit.
    Memory,
    Dynamo,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "dynamo" | "dynamodb" => Ok(Self::Dynamo),
            other => bail!("unknown backend '{other}' (expected memory or dynamo)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub table: String,
    pub orchestrator: OrchestratorConfig,
    pub dynamo: DynamoConfig,
}

impl Settings {
    pub fn from_env(args: &[String]) -> Result<Self> {
        Self::from_lookup(args, |key| std::env::var(key).ok())
    }

    /// Flags win over environment variables, which win over defaults.
    pub fn from_lookup(args: &[String], lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend = match parse_flag(args, "--backend") {
            Some(b) => b.parse()?,
            None => Backend::Dynamo,
        };
        let table = parse_flag(args, "--table")
            .or_else(|| lookup("USERS_TABLE"))
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());

        let mut orchestrator = OrchestratorConfig::default();
        if let Some(n) = env_number(&lookup, "KVBULK_CHUNK_SIZE")? {
            orchestrator.chunk_size = n;
        }
        if let Some(n) = env_number(&lookup, "KVBULK_CONCURRENCY")? {
            orchestrator.concurrency_limit = n;
        }
        if let Some(n) = env_number(&lookup, "KVBULK_MAX_RETRIES")? {
            orchestrator.retry.max_retries = n;
        }
        orchestrator
            .validate()
            .map_err(|e| anyhow!("invalid orchestrator settings: {e}"))?;

        Ok(Self {
            backend,
            table,
            orchestrator,
            dynamo: DynamoConfig::from_lookup(&lookup),
        })
    }
}

fn env_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().parse::<T>().with_context(|| format!("{key}={v}")))
        .transpose()
}
