mod vcd_api;

pub use vcd_api::{VcdApi, VcdConfig, DEFAULT_API_VERSION};
