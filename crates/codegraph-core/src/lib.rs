pub mod artifact;
pub mod config_manager;
pub mod error;
pub mod generation;
pub mod node;
pub mod traits;
pub mod types;

pub use artifact::*;
pub use config_manager::*;
pub use error::*;
pub use generation::*;
pub use node::*;
pub use traits::*;
pub use types::*;
