//! Engine-wide configuration, loaded from CLI flags or env vars via
//! `clap` with flags taking precedence over env vars over defaults.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DaProvider {
    ContentAddressed,
    HashOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverflowPolicy {
    SkipIntent,
    AbortBatch,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tessera", about = "Temporal netting engine for off-chain trade intents")]
pub struct EngineConfig {
    /// Maximum age before a batch is formed regardless of count.
    #[arg(long, env = "TESSERA_BATCH_WINDOW_SECONDS", default_value_t = 60)]
    pub batch_window_seconds: u64,

    /// Floor for forming a batch early by count.
    #[arg(long, env = "TESSERA_MIN_INTENTS_PER_BATCH", default_value_t = 1000)]
    pub min_intents_per_batch: usize,

    /// Ceiling per batch; 0 means unbounded.
    #[arg(long, env = "TESSERA_MAX_INTENTS_PER_BATCH", default_value_t = 0)]
    pub max_intents_per_batch: usize,

    /// When true, disabling signature verification aborts startup.
    #[arg(long, env = "TESSERA_PRODUCTION_STRICT", default_value_t = true)]
    pub production_strict: bool,

    /// Whether the deployment is a production environment.
    #[arg(long, env = "TESSERA_ENVIRONMENT", default_value = "production")]
    pub environment: String,

    /// Disables Ed25519 verification. Only ever valid outside production.
    #[arg(long, env = "TESSERA_DISABLE_SIGNATURE_VERIFICATION", default_value_t = false)]
    pub disable_signature_verification: bool,

    #[arg(long, env = "TESSERA_DA_PROVIDER", value_enum, default_value_t = DaProvider::ContentAddressed)]
    pub da_provider: DaProvider,

    /// Hard deadline, in seconds, for ledger commit confirmation.
    #[arg(long, env = "TESSERA_LEDGER_CONFIRMATION_TIMEOUT_SECONDS", default_value_t = 30)]
    pub ledger_confirmation_timeout_seconds: u64,

    /// Consecutive failures before the brick monitor trips.
    #[arg(long, env = "TESSERA_CIRCUIT_BREAKER_K", default_value_t = 5)]
    pub circuit_breaker_k: u32,

    /// Rolling window, in seconds, the brick monitor counts failures over.
    #[arg(long, env = "TESSERA_CIRCUIT_BREAKER_WINDOW_SECONDS", default_value_t = 120)]
    pub circuit_breaker_window_seconds: u64,

    #[arg(long, env = "TESSERA_OVERFLOW_ON_ARITHMETIC", value_enum, default_value_t = OverflowPolicy::SkipIntent)]
    pub overflow_on_arithmetic: OverflowPolicy,

    /// Whether chain-sequence-skipped intents are returned to the queue
    /// (`true`) or marked terminally skipped (`false`, the default).
    #[arg(long, env = "TESSERA_REQUEUE_SKIPPED", default_value_t = false)]
    pub requeue_skipped: bool,

    /// Seconds after which the partition guard declares `PARTITIONED`.
    #[arg(long, env = "TESSERA_PARTITION_GUARD_SECONDS", default_value_t = 120)]
    pub partition_guard_seconds: u64,

    /// Nonce-set retention, in seconds. Should cover at least a day.
    #[arg(long, env = "TESSERA_NONCE_TTL_SECONDS", default_value_t = 86_400)]
    pub nonce_ttl_seconds: u64,

    /// Processed-id retention, in seconds. Should cover at least a week.
    #[arg(long, env = "TESSERA_PROCESSED_ID_TTL_SECONDS", default_value_t = 604_800)]
    pub processed_id_ttl_seconds: u64,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://tessera.db")]
    pub database_url: String,

    #[arg(long, env = "TESSERA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "TESSERA_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "TESSERA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl EngineConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// A configuration flag that disables signature verification must
    /// terminate the process at startup when the environment is
    /// production, under `production_strict`.
    pub fn assert_startup_invariants(&self) -> Result<(), String> {
        if self.production_strict && self.is_production() && self.disable_signature_verification {
            return Err(
                "refusing to start: TESSERA_DISABLE_SIGNATURE_VERIFICATION is set in production"
                    .to_string(),
            );
        }
        Ok(())
    }
}
