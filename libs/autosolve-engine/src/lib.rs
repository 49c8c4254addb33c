pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod extract;
pub mod gateway;
pub mod parser;
pub mod prompt;
pub mod retry;
pub mod summary;

pub use engine::{build_sandbox, DockerEngine, ProcessEngine, Sandbox, SandboxFailure};
pub use executor::{Solver, SolverSettings};
pub use gateway::{HttpGateway, ModelGateway, Role, Turn};
pub use parser::{parse_challenge, ChallengeParser, ParseError};
pub use retry::RetryPolicy;
