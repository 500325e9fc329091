//! Value and type model.

mod data_type;
mod value;

pub use data_type::DataType;
pub use value::Value;
