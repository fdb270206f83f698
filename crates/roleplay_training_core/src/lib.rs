pub mod catalog;
pub mod domain;
pub mod driver;
pub mod generator;
pub mod memory;
pub mod ports;
pub mod prompt;
pub mod recorder;

pub use domain::{
    AiStaff, Guideline, KnowledgeEntry, Message, MessageIntent, MessageMetadata, Persona, Scenario,
    ScenarioDifficulty, Sender, SessionStatus, StaffRole, TrainingSession,
};
pub use driver::{DriverError, DriverEvent, DriverSettings, DriverSnapshot, DriverState, StepOutcome, TrainingDriver};
pub use generator::{TurnContext, TurnGenerator};
pub use memory::TrainingMemory;
pub use ports::{
    CustomerSimulationService, CustomerTurnRequest, GenerationError, GenerationResult, PortError, PortResult,
    StaffResponseService, StaffTurnRequest, TrainingStore,
};
