pub mod commission;
pub mod gateway;
pub mod listing;
pub mod message;
pub mod room;
pub mod user;

pub use commission::PaymentStatus;
pub use listing::{Listing, ListingKind};
pub use message::{DeliveryStatus, Message};
pub use room::Room;
pub use user::{User, UserProfile, UserType};
