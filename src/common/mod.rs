pub mod format;
pub mod logger;
pub mod path;
pub mod table;
