pub mod coordinates;
pub mod moon;
pub mod record;
pub mod weather;

pub use coordinates::Coordinates;
pub use moon::{MoonPhase, MoonSnapshot};
pub use record::{NewRecord, Record, RecordError};
pub use weather::{WeatherCondition, WeatherSnapshot};
