pub mod api;
pub mod hash;
pub mod model;

pub use api::RpcApi;
pub use hash::Hash;
pub use model::*;
