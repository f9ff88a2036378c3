mod access_token;
mod email_address;
mod plan;

pub use self::access_token::*;
pub use self::email_address::*;
pub use self::plan::*;
