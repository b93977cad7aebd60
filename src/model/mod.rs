//! Data model: recipes, the lock file, and shared value types.

pub mod lock;
pub mod recipe;
pub mod types;

pub use lock::{Lock, LockEntry, LockError};
pub use recipe::{Recipe, RecipeError, RecipeFileData};
pub use types::{FileMap, HashParseError, ObjectHash};
