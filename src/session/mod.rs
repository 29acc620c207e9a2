pub mod controller;
pub mod events;
pub mod state;

pub use controller::{RefreshOutcome, SessionController, SessionError};
pub use events::{SessionEvent, SessionEventKind, SubscriptionId};
pub use state::{MoonView, PhaseSource, SessionSnapshot, SessionState, WeatherView};
