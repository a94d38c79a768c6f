// TimesUp - action items with a durable local store, change notifications and a live clock

pub mod clock;
pub mod error;
pub mod filter;
pub mod jsonl;
pub mod models;
pub mod notifier;
pub mod record;
pub mod settings;
pub mod store;

// Re-export main types for convenience
pub use clock::{Countdown, LiveClock, Tick};
pub use error::{PersistenceError, SettingsError, StoreError};
pub use filter::ItemFilter;
pub use models::{ActionItem, Status, now_ms};
pub use notifier::{ChangeEvent, ChangeNotifier, Subscription};
pub use settings::{ClockFormat, Settings};
pub use store::Store;
