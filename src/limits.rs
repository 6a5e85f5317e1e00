/// Earliest calendar year the availability model accepts.
pub const MIN_CALENDAR_YEAR: i32 = 1970;

/// Latest calendar year the availability model accepts. Leaves room to advance a window by one year.
pub const MAX_CALENDAR_YEAR: i32 = 9998;

pub const MAX_PRODUCT_NAME_LEN: usize = 200;
pub const MAX_COLOR_LEN: usize = 50;
pub const MAX_IMAGE_URL_LEN: usize = 2048;
pub const MAX_TIME_SLOT_LEN: usize = 64;

/// Highest star rating a review can give; the lowest is 1.
pub const MAX_REVIEW_RATING: u8 = 5;
pub const MAX_REVIEW_COMMENT_LEN: usize = 2000;

/// Upper bound on a rental price in rupees.
pub const MAX_PRICE: u32 = 10_000_000;

/// Pending requests shown on the dashboard overview.
pub const DASHBOARD_RECENT_PENDING: usize = 5;

/// Buffered engine commands per session.
pub const SESSION_COMMAND_QUEUE: usize = 64;
