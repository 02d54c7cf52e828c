pub mod id;
pub mod location;

pub use id::{generate_id, generate_node_id};
pub use location::{LocationUpdate, ParseError};
