pub mod patterns;
pub mod detector;
pub mod normalize;
pub mod password;
pub mod registry;
pub mod markers;
pub mod replacer;
pub mod document;
pub mod watcher;
pub mod change;
pub mod conductor;
pub mod access;

pub use patterns::*;
pub use detector::*;
pub use normalize::*;
pub use password::*;
pub use registry::*;
pub use document::*;
pub use watcher::*;
pub use change::*;
pub use conductor::*;
pub use access::*;

#[cfg(test)]
mod tests;
