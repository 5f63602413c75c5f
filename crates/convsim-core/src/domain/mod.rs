pub mod conversation;
pub mod error;
pub mod goal;
pub mod persona;
pub mod simulation;

pub use conversation::{ConversationTurn, Role, TRANSPORT_ERROR_MARKER};
pub use error::{Result, SimError};
pub use goal::{Complexity, Goal};
pub use persona::{Persona, PersonaTraits};
pub use simulation::{SimulationConfig, SimulationMetrics, SimulationResult};
