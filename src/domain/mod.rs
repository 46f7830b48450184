pub mod capabilities;
pub mod issue;
pub mod requirements;
pub mod sync;
pub mod ticket;
