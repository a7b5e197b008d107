mod posts;
mod traits;

pub use posts::SqlitePostRepository;
pub use traits::PostRepository;
