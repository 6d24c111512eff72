// Activity log action names
pub const SESSION_STARTED: &str = "SESSION_STARTED";
pub const SESSION_RESTORED: &str = "SESSION_RESTORED";
pub const SESSION_ENDED: &str = "SESSION_ENDED";
pub const GROUP_CREATED: &str = "GROUP_CREATED";
pub const GROUP_JOINED: &str = "GROUP_JOINED";
pub const MEMBER_ADDED: &str = "MEMBER_ADDED";
pub const FRIEND_ADDED: &str = "FRIEND_ADDED";
pub const FRIEND_REQUEST_ACCEPTED: &str = "FRIEND_REQUEST_ACCEPTED";
pub const FRIEND_REQUEST_REJECTED: &str = "FRIEND_REQUEST_REJECTED";
pub const EXPENSE_PENDING: &str = "EXPENSE_PENDING";
pub const EXPENSE_RETRYING: &str = "EXPENSE_RETRYING";
pub const EXPENSE_COMMITTED: &str = "EXPENSE_COMMITTED";
pub const EXPENSE_ROLLED_BACK: &str = "EXPENSE_ROLLED_BACK";

// Input limits
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_GROUP_NAME_LENGTH: usize = 100;
pub const MAX_USERNAME_LENGTH: usize = 150;
/// Largest accepted expense total, in minor units (1,000,000.00).
pub const MAX_EXPENSE_MINOR: i64 = 100_000_000;

// Ledger
/// Settled submissions kept per group view.
pub const MAX_SUBMISSION_HISTORY: usize = 50;
