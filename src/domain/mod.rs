pub mod models;
pub mod routing;
pub mod timing;
