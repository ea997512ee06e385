//! In-memory CAN bus and node used to exercise the client end to end
pub mod sim_bus;
pub mod sim_node;
