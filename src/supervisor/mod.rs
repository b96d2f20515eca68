//! Supervisor: the cooperative driver that keeps an agent productively
//! engaged inside its sandbox when no human is attached to the Gateway.
//!
//! The pure decision logic ([`turn`], [`enforcement`], [`state`]) is kept
//! separate from the async orchestration ([`driver`]) so the scheduling
//! formulas and task-limit checks can be exercised without a runtime.

pub mod driver;
pub mod enforcement;
pub mod state;
pub mod task;
pub mod turn;

pub use driver::{GatewayClient, PresenceSnapshot, SupervisorDriver, TaskStore};
pub use state::{SupervisorControlAction, SupervisorState};
pub use task::{Question, Task, TaskStatus};
pub use turn::{EscalationTier, TurnClass, TurnMetrics};
