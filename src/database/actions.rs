mod favorites;
mod follows;
mod ingredients;
mod recipes;
mod tags;
mod users;

pub use favorites::*;
pub use follows::*;
pub use ingredients::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;
