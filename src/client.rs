mod tmdb_client;

pub use self::tmdb_client::*;
