mod analytics;
mod subscriptions;
mod users;

pub use self::analytics::*;
pub use self::subscriptions::*;
pub use self::users::*;
