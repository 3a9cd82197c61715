//! Generic parameter and response marshalling
//!
//! Nothing here knows about any particular service: it only reshapes trees.

pub mod case;
pub mod expand;
pub mod input;
pub mod node;
pub mod output;

pub use case::{camel_to_snake, snake_keys, to_camel, to_pascal, KeyCase};
pub use expand::{apply_expanders, filter_map_to_list, tag_list_to_map, tag_map_to_list};
pub use input::{normalize_input, OMIT_PREFIX};
pub use node::{ResponseNode, StreamingBody};
pub use output::{format_timestamp, normalize_output};
