pub mod adam;
pub mod schedulers;
