pub mod analyst;
pub mod config;
pub mod consensus;
pub mod guidance;
pub mod health;
pub mod vote;

pub use analyst::{
    AnalystConfig, AnalystRuntimeConfig, AnalystSpec, Priority, PriorityClass, PrioritySetting,
    ProtocolFamily, RegistryStatistics, ValidationReport,
};
pub use config::{
    CacheConfig, CvaultConfig, EngineConfig, EnvSnapshot, ENV_OVERRIDE_PREFIX, ENV_PROXY_ENABLED,
    ENV_SELECTION, ENV_SINGLE_ANALYST,
};
pub use consensus::{
    ConsensusResult, ConsensusStatus, ConsensusSummary, VoteCounts, CONSENSUS_THRESHOLD,
    MIN_VALID_VOTES,
};
pub use guidance::{GuidanceKind, Severity, UserGuidance};
pub use health::{AnalystHealth, HealthRecord, HealthStatus, SystemHealthSummary};
pub use vote::{ParsedOpinion, Signal, Vote, VoteStatus};
