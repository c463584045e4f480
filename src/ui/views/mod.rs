mod feed;
mod guidelines;
mod post;

pub use feed::FeedView;
pub use guidelines::GuidelinesView;
pub use post::PostView;
