pub mod binding;
pub mod registry;
pub mod traits;

pub use binding::{OperatorBuilder, OperatorMeta, ParamInfo, SlotFlags, SlotInfo};
pub use registry::{OperatorEntry, OperatorInstance, OperatorRegistry};
pub use traits::{Operator, RunContext};
