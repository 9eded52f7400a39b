use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    #[error("fake confirmation: slot for tx did not advance monotonically")]
    FakeConfirmation,

    #[error("circuit breaker tripped, refusing commits until cooldown elapses")]
    CircuitTripped,

    #[error("network partitioned: no slot advance observed for longer than the guard window")]
    Partitioned,
}

pub type ResilienceResult<T> = Result<T, ResilienceError>;
