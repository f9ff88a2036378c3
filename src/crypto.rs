mod webhook_signature;

pub use self::webhook_signature::*;
