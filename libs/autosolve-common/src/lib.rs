pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod types;

pub use cache::{CacheError, SolutionCache};
pub use fingerprint::Fingerprint;
pub use types::{
    AttemptRecord, ChallengeSpec, ExecutionReport, GatewayFailure, Outcome, SolvedChallenge,
    TestCase, TestResult,
};
