pub mod error;
pub mod events;
pub mod id;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{HandoffEvent, HandoffRelay, Stage, Subscription};
pub use id::{IdError, generate_visit_id, validate_visit_id};
pub use time::{now_millis, now_utc};
