pub mod messages;
pub mod rooms;
