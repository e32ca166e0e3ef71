pub mod algebra;
pub mod model;
pub mod operations;
pub mod permissions;
pub mod routes;
pub mod store;
