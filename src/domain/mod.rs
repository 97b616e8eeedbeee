pub mod entities;
pub mod value_objects;
pub mod services;
pub mod registry;
pub mod events;
pub mod errors;

pub use entities::*;
pub use value_objects::*;
pub use services::*;
pub use registry::*;
pub use events::*;
pub use errors::*;
