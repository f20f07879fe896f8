pub mod events;
pub mod integration;
pub mod mapping;
pub mod order;

pub use events::*;
pub use integration::*;
pub use mapping::*;
pub use order::*;
