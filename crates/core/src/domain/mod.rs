pub mod batch;
pub mod contract;
pub mod explanation;
pub mod forecast;
