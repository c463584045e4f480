pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, service_host, HeaderContext};
pub use utils::{post_type_color, relative_time, truncate};
