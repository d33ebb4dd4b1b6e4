pub mod field_report;
pub mod resource;
pub mod resource_movement;
pub mod ticket;
