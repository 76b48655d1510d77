//! Action templates, granted specs, and runtime instances.
//!
//! - [`ActionTemplate`]: authored, read-only definition (phases, tags, costs)
//! - [`ActionSpec`]: a template granted to one entity with an input and level
//! - [`ActiveAction`]: one replicated, in-flight execution of a spec
//! - [`ActionInstance`]: the local runtime object driving an execution's
//!   phases and owning what it acquires

mod error;
mod instance;
mod spec;
mod template;

pub use error::{ActivationError, ActivationFailure, RegistryError};
pub use instance::{ActionInstance, Lifecycle, ResourceId, SpawnedResource};
pub(crate) use instance::{ActiveRule, TaskBusHandler};
pub use spec::{ActionSpec, ActiveAction};
pub use template::{
    ActionTemplate, ActionTemplateId, ActivationPolicy, AdditionalCost, InstancingPolicy, LevelData,
    NetExecutionPolicy,
};
