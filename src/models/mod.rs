// Data models and response shapes

pub mod page;
pub mod ride;
pub mod ride_event;
pub mod user;

pub use page::*;
pub use ride::*;
pub use ride_event::*;
pub use user::*;
